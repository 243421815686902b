//! HTTP implementation of [`DebateApi`] against the debate backend.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | participants | `GET /api/models` |
//! | market | `GET /api/markets/{id}` |
//! | start | `POST /api/debate/start` |
//! | stream | `GET /api/debate/{id}/stream` (SSE) |
//! | results | `GET /api/debate/{id}/results` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use debate_core::api::DebateApi;
use debate_core::errors::ApiError;
use debate_core::ids::{ParticipantId, SessionId};
use debate_core::market::MarketDetail;
use debate_core::outcome::DebateOutcome;
use debate_core::participant::{Participant, ParticipantListing};
use debate_core::stream::EventStream;
use debate_settings::ApiSettings;

use crate::sse::frame_stream;

#[derive(Serialize)]
struct StartRequest<'a> {
    market_id: &'a str,
    model_ids: &'a [ParticipantId],
    rounds: u32,
}

#[derive(Deserialize)]
struct StartResponse {
    #[serde(alias = "sessionId")]
    session_id: SessionId,
}

pub struct HttpDebateApi {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpDebateApi {
    /// Build a client from API settings.
    ///
    /// The request timeout applies to every call except the push stream,
    /// which stays open for the length of a debate.
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let base_url = Url::parse(settings.base_url.trim())
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ApiError::Network(format!("invalid base URL {}", settings.base_url)))?;
        Ok(Self {
            client,
            base_url,
            request_timeout: settings.request_timeout(),
        })
    }

    /// Base URL plus `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Network(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = ApiError::from_status(status.as_u16(), &body);
            error!(status = status.as_u16(), error = %err, "debate API error");
            return Err(err);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DebateApi for HttpDebateApi {
    #[instrument(skip_all, fields(op = "list_participants"))]
    async fn list_participants(&self) -> Result<Vec<Participant>, ApiError> {
        let listing: ParticipantListing = self
            .send_json(self.client.get(self.endpoint(&["api", "models"])?))
            .await?;
        let participants = listing.into_vec();
        debug!(count = participants.len(), "loaded participant catalog");
        Ok(participants)
    }

    #[instrument(skip(self), fields(op = "get_market"))]
    async fn get_market(&self, market_id: &str) -> Result<MarketDetail, ApiError> {
        let url = self.endpoint(&["api", "markets", market_id])?;
        self.send_json(self.client.get(url)).await
    }

    #[instrument(skip(self, participant_ids), fields(op = "start_session", participants = participant_ids.len()))]
    async fn start_session(
        &self,
        market_id: &str,
        participant_ids: &[ParticipantId],
        rounds: u32,
    ) -> Result<SessionId, ApiError> {
        let body = StartRequest {
            market_id,
            model_ids: participant_ids,
            rounds,
        };
        let response: StartResponse = self
            .send_json(self.client.post(self.endpoint(&["api", "debate", "start"])?).json(&body))
            .await?;
        info!(session_id = %response.session_id, "debate session started");
        Ok(response.session_id)
    }

    #[instrument(skip(self), fields(op = "open_stream", session_id = %session_id))]
    async fn open_stream(&self, session_id: &SessionId) -> Result<EventStream, ApiError> {
        let url = self.endpoint(&["api", "debate", session_id.as_str(), "stream"])?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = ApiError::from_status(status.as_u16(), &body);
            error!(status = status.as_u16(), error = %err, "stream subscription rejected");
            return Err(err);
        }

        debug!("push stream opened");
        Ok(frame_stream(response.bytes_stream()))
    }

    #[instrument(skip(self), fields(op = "get_results", session_id = %session_id))]
    async fn get_results(&self, session_id: &SessionId) -> Result<DebateOutcome, ApiError> {
        let url = self.endpoint(&["api", "debate", session_id.as_str(), "results"])?;
        self.send_json(self.client.get(url)).await
    }
}
