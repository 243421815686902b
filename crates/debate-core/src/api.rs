use async_trait::async_trait;

use crate::errors::ApiError;
use crate::ids::{ParticipantId, SessionId};
use crate::market::MarketDetail;
use crate::outcome::DebateOutcome;
use crate::participant::Participant;
use crate::stream::EventStream;

/// Session API consumed by the lifecycle controller (HTTP in production,
/// scripted in tests).
#[async_trait]
pub trait DebateApi: Send + Sync {
    async fn list_participants(&self) -> Result<Vec<Participant>, ApiError>;

    async fn get_market(&self, market_id: &str) -> Result<MarketDetail, ApiError>;

    async fn start_session(
        &self,
        market_id: &str,
        participant_ids: &[ParticipantId],
        rounds: u32,
    ) -> Result<SessionId, ApiError>;

    /// Open the push stream for a started session. Dropping the returned
    /// stream releases the connection.
    async fn open_stream(&self, session_id: &SessionId) -> Result<EventStream, ApiError>;

    async fn get_results(&self, session_id: &SessionId) -> Result<DebateOutcome, ApiError>;
}
