use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

use debate_core::api::DebateApi;
use debate_core::errors::ApiError;
use debate_core::ids::{ParticipantId, SessionId};
use debate_core::market::MarketDetail;
use debate_core::outcome::DebateOutcome;
use debate_core::participant::Participant;
use debate_core::stream::{EventStream, SseFrame};

type FrameResult = Result<SseFrame, ApiError>;

/// One recorded `start_session` call.
#[derive(Clone, Debug, PartialEq)]
pub struct StartCall {
    pub market_id: String,
    pub participant_ids: Vec<ParticipantId>,
    pub rounds: u32,
    /// Session id handed back, if the call succeeded.
    pub session_id: Option<SessionId>,
}

/// In-memory [`DebateApi`] for deterministic tests.
///
/// Start replies are scripted in order (a fresh id when the script runs out).
/// Stream frames are pushed live per session with [`push`](Self::push), and
/// every subscription records its own release in [`stream_drops`](Self::stream_drops).
#[derive(Default)]
pub struct MockDebateApi {
    participants: Mutex<Vec<Participant>>,
    participants_error: Mutex<Option<ApiError>>,
    markets: Mutex<HashMap<String, MarketDetail>>,
    start_script: Mutex<VecDeque<Result<SessionId, ApiError>>>,
    stream_failures: Mutex<VecDeque<ApiError>>,
    results: Mutex<HashMap<SessionId, Result<DebateOutcome, ApiError>>>,
    result_gates: Mutex<HashMap<SessionId, Arc<Notify>>>,
    result_crashes: Mutex<HashSet<SessionId>>,
    feeds: Mutex<HashMap<SessionId, mpsc::UnboundedSender<FrameResult>>>,
    backlog: Mutex<HashMap<SessionId, Vec<FrameResult>>>,
    start_calls: Mutex<Vec<StartCall>>,
    result_calls: Mutex<Vec<SessionId>>,
    stream_opens: AtomicUsize,
    stream_drops: Arc<AtomicUsize>,
}

impl MockDebateApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_participants(self, participants: Vec<Participant>) -> Self {
        *self.participants.lock() = participants;
        self
    }

    pub fn fail_participants(&self, error: ApiError) {
        *self.participants_error.lock() = Some(error);
    }

    pub fn add_market(&self, market: MarketDetail) {
        let _ = self.markets.lock().insert(market.id.clone(), market);
    }

    /// Queue the reply for the next start call.
    pub fn script_start(&self, reply: Result<SessionId, ApiError>) {
        self.start_script.lock().push_back(reply);
    }

    /// Make the next `open_stream` call fail.
    pub fn fail_next_stream(&self, error: ApiError) {
        self.stream_failures.lock().push_back(error);
    }

    pub fn set_results(&self, session_id: &SessionId, reply: Result<DebateOutcome, ApiError>) {
        let _ = self.results.lock().insert(session_id.clone(), reply);
    }

    /// Hold the results reply for `session_id` until the returned handle is notified.
    pub fn gate_results(&self, session_id: &SessionId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        let _ = self
            .result_gates
            .lock()
            .insert(session_id.clone(), Arc::clone(&gate));
        gate
    }

    /// Make the results call for `session_id` panic, as a crashed handler would.
    pub fn crash_results(&self, session_id: &SessionId) {
        let _ = self.result_crashes.lock().insert(session_id.clone());
    }

    /// Deliver a frame on the session's stream. Frames pushed before the
    /// stream opens are replayed on open.
    pub fn push(&self, session_id: &SessionId, frame: SseFrame) {
        self.push_result(session_id, Ok(frame));
    }

    /// Deliver a transport error on the session's stream.
    pub fn push_error(&self, session_id: &SessionId, error: ApiError) {
        self.push_result(session_id, Err(error));
    }

    fn push_result(&self, session_id: &SessionId, item: FrameResult) {
        let feeds = self.feeds.lock();
        match feeds.get(session_id) {
            Some(tx) => {
                let _ = tx.send(item);
            }
            None => self
                .backlog
                .lock()
                .entry(session_id.clone())
                .or_default()
                .push(item),
        }
    }

    /// End the session's stream as if the server closed it.
    pub fn end_stream(&self, session_id: &SessionId) {
        let _ = self.feeds.lock().remove(session_id);
    }

    pub fn start_calls(&self) -> Vec<StartCall> {
        self.start_calls.lock().clone()
    }

    /// Session id returned by the most recent successful start.
    pub fn last_session(&self) -> Option<SessionId> {
        self.start_calls
            .lock()
            .iter()
            .rev()
            .find_map(|call| call.session_id.clone())
    }

    pub fn result_calls(&self) -> Vec<SessionId> {
        self.result_calls.lock().clone()
    }

    pub fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }

    pub fn stream_drops(&self) -> usize {
        self.stream_drops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DebateApi for MockDebateApi {
    async fn list_participants(&self) -> Result<Vec<Participant>, ApiError> {
        if let Some(err) = self.participants_error.lock().clone() {
            return Err(err);
        }
        Ok(self.participants.lock().clone())
    }

    async fn get_market(&self, market_id: &str) -> Result<MarketDetail, ApiError> {
        self.markets
            .lock()
            .get(market_id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: format!("Market {market_id} not found"),
            })
    }

    async fn start_session(
        &self,
        market_id: &str,
        participant_ids: &[ParticipantId],
        rounds: u32,
    ) -> Result<SessionId, ApiError> {
        let reply = self
            .start_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(SessionId::generate()));
        self.start_calls.lock().push(StartCall {
            market_id: market_id.to_string(),
            participant_ids: participant_ids.to_vec(),
            rounds,
            session_id: reply.as_ref().ok().cloned(),
        });
        reply
    }

    async fn open_stream(&self, session_id: &SessionId) -> Result<EventStream, ApiError> {
        if let Some(err) = self.stream_failures.lock().pop_front() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut feeds = self.feeds.lock();
            let backlog = self.backlog.lock().remove(session_id).unwrap_or_default();
            for item in backlog {
                let _ = tx.send(item);
            }
            let _ = feeds.insert(session_id.clone(), tx);
        }
        let _ = self.stream_opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::pin(TrackedStream {
            inner: UnboundedReceiverStream::new(rx),
            drops: Arc::clone(&self.stream_drops),
        }))
    }

    async fn get_results(&self, session_id: &SessionId) -> Result<DebateOutcome, ApiError> {
        self.result_calls.lock().push(session_id.clone());

        let gate = self.result_gates.lock().get(session_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.result_crashes.lock().contains(session_id) {
            panic!("results handler crashed for {session_id}");
        }

        self.results
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| {
                Ok(DebateOutcome {
                    session_id: Some(session_id.clone()),
                    final_predictions: Vec::new(),
                    summary: Default::default(),
                })
            })
    }
}

/// Stream handed out by the mock; counts its own release.
struct TrackedStream {
    inner: UnboundedReceiverStream<FrameResult>,
    drops: Arc<AtomicUsize>,
}

impl Stream for TrackedStream {
    type Item = FrameResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        let _ = self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Frame builders for the debate event vocabulary.
pub mod frames {
    use debate_core::events::names;
    use debate_core::stream::SseFrame;
    use serde_json::json;

    pub fn started(models: &[&str]) -> SseFrame {
        SseFrame::new(names::DEBATE_STARTED, json!({ "models": models }).to_string())
    }

    pub fn thinking(model_name: &str) -> SseFrame {
        SseFrame::new(
            names::MODEL_THINKING,
            json!({ "model_name": model_name }).to_string(),
        )
    }

    pub fn message(model_name: &str, round: u32, text: &str) -> SseFrame {
        SseFrame::new(
            names::MESSAGE,
            json!({
                "model_name": model_name,
                "round": round,
                "message_type": if round == 1 { "initial" } else { "rebuttal" },
                "text": text,
                "predictions": { "Yes": 50.0, "No": 50.0 },
            })
            .to_string(),
        )
    }

    pub fn round_complete(round: u32, next_round: Option<u32>) -> SseFrame {
        let body = match next_round {
            Some(next) => json!({ "round": round, "next_round": next }),
            None => json!({ "round": round }),
        };
        SseFrame::new(names::ROUND_COMPLETE, body.to_string())
    }

    pub fn complete(total_rounds: u32) -> SseFrame {
        SseFrame::new(
            names::DEBATE_COMPLETE,
            json!({ "total_rounds": total_rounds }).to_string(),
        )
    }

    pub fn server_error(message: &str) -> SseFrame {
        SseFrame::new(names::ERROR, json!({ "message": message }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn start_defaults_to_generated_session() {
        let mock = MockDebateApi::new();
        let id = mock
            .start_session("mkt", &[ParticipantId::from("a")], 2)
            .await
            .unwrap();
        assert!(id.as_str().starts_with("sess_"));
        assert_eq!(mock.last_session(), Some(id));
        assert_eq!(mock.start_calls()[0].rounds, 2);
    }

    #[tokio::test]
    async fn scripted_start_failure_is_recorded() {
        let mock = MockDebateApi::new();
        mock.script_start(Err(ApiError::Status {
            status: 400,
            message: "Market is closed".into(),
        }));
        let err = mock.start_session("mkt", &[], 1).await.unwrap_err();
        assert_eq!(err.to_string(), "Market is closed");
        assert_eq!(mock.start_calls()[0].session_id, None);
        assert_eq!(mock.last_session(), None);
    }

    #[tokio::test]
    async fn backlog_then_live_frames() {
        let mock = MockDebateApi::new();
        let id = SessionId::from("s1");
        mock.push(&id, frames::started(&["A"]));

        let mut stream = mock.open_stream(&id).await.unwrap();
        mock.push(&id, frames::complete(1));
        mock.end_stream(&id);

        let names: Vec<String> = stream
            .by_ref()
            .map(|f| f.unwrap().event)
            .collect()
            .await;
        assert_eq!(names, vec!["debate_started", "debate_complete"]);
        assert_eq!(mock.stream_drops(), 0);
        drop(stream);
        assert_eq!(mock.stream_drops(), 1);
    }

    #[tokio::test]
    async fn scripted_stream_failure() {
        let mock = MockDebateApi::new();
        mock.fail_next_stream(ApiError::Network("refused".into()));
        assert!(mock.open_stream(&SessionId::from("s1")).await.is_err());
        assert_eq!(mock.stream_opens(), 0);
        assert!(mock.open_stream(&SessionId::from("s1")).await.is_ok());
        assert_eq!(mock.stream_opens(), 1);
    }

    #[tokio::test]
    async fn gated_results_wait_for_release() {
        let mock = Arc::new(MockDebateApi::new());
        let id = SessionId::from("s1");
        let gate = mock.gate_results(&id);

        let fetch = {
            let mock = Arc::clone(&mock);
            let id = id.clone();
            tokio::spawn(async move { mock.get_results(&id).await })
        };
        tokio::task::yield_now().await;
        assert!(!fetch.is_finished());

        gate.notify_one();
        let outcome = fetch.await.unwrap().unwrap();
        assert_eq!(outcome.session_id, Some(id));
    }

    #[tokio::test]
    async fn unknown_market_is_not_found() {
        let mock = MockDebateApi::new();
        let err = mock.get_market("nope").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 404, .. }));
    }
}
