//! Debate lifecycle controller.
//!
//! ```text
//! Setup ──start──▶ Starting ──ok──▶ Streaming ──debate_complete──▶ Completed
//!                     │                 │
//!                     └──fail──▶ Error ◀┘ error / fatal stream failure
//! ```
//!
//! `reset()` returns to Setup from any state. The controller is a single-owner
//! state machine: [`DebateController::pump`] awaits the next input (stream
//! event or results reply) and applies it before the next one is read.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use debate_core::api::DebateApi;
use debate_core::errors::{ApiError, DebateError};
use debate_core::events::{DebateEvent, DebateTurn, StreamFailure};
use debate_core::ids::{ParticipantId, SessionId};
use debate_core::lifecycle::LifecycleStatus;
use debate_core::outcome::DebateOutcome;
use debate_core::participant::{eligible_only, Participant};

use crate::dispatcher::{Dispatcher, StreamConfig};
use crate::selection::{validate_start, ParticipantSelection};
use crate::tracker::RoundTracker;

/// Where the post-debate verdict stands.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResultsState {
    #[default]
    NotRequested,
    Pending,
    Ready(DebateOutcome),
    /// Fetch failed. The debate still counts as completed.
    Failed(String),
}

/// What a single applied input changed.
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    Started { models: Vec<String> },
    Thinking { participant: String },
    Turn(DebateTurn),
    RoundAdvanced { round: u32 },
    Completed { round: u32 },
    Notice(StreamFailure),
    Failed(DebateError),
    ResultsReady,
    ResultsFailed(String),
    Ignored,
}

enum ControllerInput {
    Results {
        session_id: SessionId,
        result: Result<DebateOutcome, ApiError>,
    },
}

struct ActiveSession {
    id: Option<SessionId>,
    market_id: String,
    participants: Vec<ParticipantId>,
    rounds_requested: u32,
}

pub struct DebateController {
    api: Arc<dyn DebateApi>,
    config: StreamConfig,
    status: LifecycleStatus,
    session: Option<ActiveSession>,
    tracker: RoundTracker,
    subscription: Option<Dispatcher>,
    thinking: BTreeSet<String>,
    results: ResultsState,
    error: Option<DebateError>,
    notices: Vec<StreamFailure>,
    catalog: Vec<Participant>,
    selection: ParticipantSelection,
    inbox_tx: mpsc::UnboundedSender<ControllerInput>,
    inbox_rx: mpsc::UnboundedReceiver<ControllerInput>,
    fetches_in_flight: usize,
}

impl DebateController {
    pub fn new(api: Arc<dyn DebateApi>, config: StreamConfig) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            api,
            config,
            status: LifecycleStatus::Setup,
            session: None,
            tracker: RoundTracker::new(),
            subscription: None,
            thinking: BTreeSet::new(),
            results: ResultsState::NotRequested,
            error: None,
            notices: Vec::new(),
            catalog: Vec::new(),
            selection: ParticipantSelection::new(),
            inbox_tx,
            inbox_rx,
            fetches_in_flight: 0,
        }
    }

    // ── accessors ───────────────────────────────────────────────────────

    pub fn status(&self) -> LifecycleStatus {
        self.status
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().and_then(|s| s.id.as_ref())
    }

    pub fn market_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.market_id.as_str())
    }

    /// Participants of the active session, in start order.
    pub fn participants(&self) -> &[ParticipantId] {
        self.session
            .as_ref()
            .map(|s| s.participants.as_slice())
            .unwrap_or_default()
    }

    pub fn rounds_requested(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.rounds_requested)
    }

    pub fn current_round(&self) -> u32 {
        self.tracker.current_round()
    }

    pub fn transcript(&self) -> &[DebateTurn] {
        self.tracker.transcript()
    }

    /// Participants announced as thinking whose turn has not arrived yet.
    pub fn thinking(&self) -> impl Iterator<Item = &str> {
        self.thinking.iter().map(String::as_str)
    }

    pub fn results(&self) -> &ResultsState {
        &self.results
    }

    pub fn outcome(&self) -> Option<&DebateOutcome> {
        match &self.results {
            ResultsState::Ready(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Reason the session entered Error.
    pub fn error(&self) -> Option<&DebateError> {
        self.error.as_ref()
    }

    /// Non-fatal stream failures seen in this session.
    pub fn notices(&self) -> &[StreamFailure] {
        &self.notices
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn catalog(&self) -> &[Participant] {
        &self.catalog
    }

    pub fn selection(&self) -> &ParticipantSelection {
        &self.selection
    }

    // ── participant selection ───────────────────────────────────────────

    /// Load the participant catalog, keeping only eligible entries.
    #[instrument(skip(self))]
    pub async fn load_participants(&mut self) -> Result<usize, ApiError> {
        let all = self.api.list_participants().await?;
        let total = all.len();
        self.catalog = eligible_only(all);
        let catalog = &self.catalog;
        self.selection
            .retain(|id| catalog.iter().any(|p| &p.id == id));
        info!(total, eligible = self.catalog.len(), "participant catalog loaded");
        Ok(self.catalog.len())
    }

    fn is_selectable(&self, id: &ParticipantId) -> bool {
        self.catalog.iter().any(|p| &p.id == id && p.eligible)
    }

    /// Add a catalog participant. Unknown, ineligible, duplicate or fifth
    /// picks leave the selection unchanged.
    pub fn select(&mut self, id: &ParticipantId) -> bool {
        if !self.is_selectable(id) {
            debug!(participant = %id, "not selectable");
            return false;
        }
        self.selection.add(id.clone())
    }

    pub fn deselect(&mut self, id: &ParticipantId) -> bool {
        self.selection.remove(id)
    }

    /// Flip a participant's membership. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: &ParticipantId) -> bool {
        if !self.selection.contains(id) && !self.is_selectable(id) {
            debug!(participant = %id, "not selectable");
            return false;
        }
        self.selection.toggle(id.clone())
    }

    pub async fn start_selected(&mut self, market_id: &str, rounds: u32) -> Result<SessionId, DebateError> {
        let participants = self.selection.ids().to_vec();
        self.start(market_id, &participants, rounds).await
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    /// Start a session and open its push stream.
    ///
    /// Validation runs before any request and leaves the controller in Setup.
    /// A rejected start or stream subscription moves it to Error.
    #[instrument(skip(self, participants), fields(participants = participants.len()))]
    pub async fn start(
        &mut self,
        market_id: &str,
        participants: &[ParticipantId],
        rounds: u32,
    ) -> Result<SessionId, DebateError> {
        if self.status != LifecycleStatus::Setup {
            return Err(DebateError::InvalidState {
                action: "start",
                status: self.status,
            });
        }
        validate_start(participants, rounds)?;

        self.session = Some(ActiveSession {
            id: None,
            market_id: market_id.to_string(),
            participants: participants.to_vec(),
            rounds_requested: rounds,
        });
        self.transition(LifecycleStatus::Starting);

        let session_id = match self.api.start_session(market_id, participants, rounds).await {
            Ok(id) => id,
            Err(e) => {
                let err = DebateError::StartFailure(e.to_string());
                let _ = self.fail(err.clone());
                return Err(err);
            }
        };
        if let Some(session) = self.session.as_mut() {
            session.id = Some(session_id.clone());
        }

        match self.api.open_stream(&session_id).await {
            Ok(stream) => {
                self.subscription = Some(Dispatcher::new(
                    session_id.clone(),
                    stream,
                    self.config.clone(),
                ));
                self.transition(LifecycleStatus::Streaming);
                Ok(session_id)
            }
            Err(e) => {
                let err = DebateError::StreamFailure(format!("could not open debate stream: {e}"));
                let _ = self.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Wait for and apply the next input. `None` when nothing more can arrive:
    /// no open subscription and no results fetch in flight.
    pub async fn pump(&mut self) -> Option<Update> {
        if self.subscription.is_none() && self.fetches_in_flight == 0 {
            return None;
        }

        enum Step {
            Input(ControllerInput),
            Event(Option<DebateEvent>),
        }

        let step = tokio::select! {
            biased;
            Some(input) = self.inbox_rx.recv() => Step::Input(input),
            event = next_event(&mut self.subscription) => Step::Event(event),
        };

        let update = match step {
            Step::Input(ControllerInput::Results { session_id, result }) => {
                self.fetches_in_flight = self.fetches_in_flight.saturating_sub(1);
                self.handle_results(&session_id, result)
            }
            Step::Event(Some(event)) => self.handle_event(event),
            Step::Event(None) => Update::Ignored,
        };
        Some(update)
    }

    /// Pump until nothing more can arrive. Returns the final status.
    pub async fn run_to_end(&mut self) -> LifecycleStatus {
        while self.pump().await.is_some() {}
        self.status
    }

    /// Pump until done or `cancel` fires, handing every update to `on_update`.
    /// Cancellation tears the session down as a reset.
    pub async fn drive(
        &mut self,
        cancel: &CancellationToken,
        mut on_update: impl FnMut(&Self, &Update),
    ) -> LifecycleStatus {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(status = %self.status, "debate cancelled");
                    self.reset();
                    return self.status;
                }
                next = self.pump() => next,
            };
            match next {
                Some(update) => on_update(&*self, &update),
                None => return self.status,
            }
        }
    }

    /// Apply one stream event. Events outside Streaming are ignored.
    pub fn handle_event(&mut self, event: DebateEvent) -> Update {
        if self.status != LifecycleStatus::Streaming {
            debug!(event = event.name(), status = %self.status, "ignoring event outside streaming");
            return Update::Ignored;
        }

        match event {
            DebateEvent::DebateStarted(started) => {
                info!(models = ?started.models, "debate started");
                Update::Started {
                    models: started.models,
                }
            }
            DebateEvent::ModelThinking(thinking) => {
                let participant = thinking.participant_key().to_string();
                let _ = self.thinking.insert(participant.clone());
                Update::Thinking { participant }
            }
            DebateEvent::Message(turn) => {
                let _ = self.thinking.remove(turn.participant_key());
                self.tracker.append(turn.clone());
                Update::Turn(turn)
            }
            DebateEvent::RoundComplete(done) => {
                let next = done.resolved_next_round();
                let capped = self.rounds_requested().map_or(next, |max| next.min(max));
                let round = self.tracker.advance_to(capped);
                info!(completed = done.round, round, "round complete");
                Update::RoundAdvanced { round }
            }
            DebateEvent::DebateComplete(done) => self.complete(done.total_rounds),
            DebateEvent::StreamError(failure) if failure.fatal => {
                self.fail(DebateError::StreamFailure(failure.message))
            }
            DebateEvent::StreamError(failure) => {
                warn!(error = %failure.message, "non-fatal stream failure");
                self.notices.push(failure.clone());
                Update::Notice(failure)
            }
        }
    }

    /// Discard the session and return to Setup. The participant catalog and
    /// selection survive.
    pub fn reset(&mut self) {
        self.close_subscription("reset");
        self.session = None;
        self.tracker = RoundTracker::new();
        self.thinking.clear();
        self.results = ResultsState::NotRequested;
        self.error = None;
        self.notices.clear();
        self.transition(LifecycleStatus::Setup);
    }

    fn complete(&mut self, total_rounds: u32) -> Update {
        let round = self.tracker.advance_to(total_rounds);
        self.close_subscription("completed");
        self.thinking.clear();
        self.transition(LifecycleStatus::Completed);
        self.request_results();
        Update::Completed { round }
    }

    fn fail(&mut self, err: DebateError) -> Update {
        error!(kind = err.error_kind(), error = %err, "debate failed");
        self.close_subscription("failed");
        self.thinking.clear();
        self.error = Some(err.clone());
        self.transition(LifecycleStatus::Error);
        Update::Failed(err)
    }

    fn request_results(&mut self) {
        let Some(session_id) = self.session_id().cloned() else {
            self.results = ResultsState::Failed("no session to fetch results for".into());
            return;
        };
        self.results = ResultsState::Pending;
        self.fetches_in_flight += 1;

        let api = Arc::clone(&self.api);
        let inbox = self.inbox_tx.clone();
        debug!(session_id = %session_id, "fetching results");
        let fetch_id = session_id.clone();
        let fetch = tokio::spawn(async move { api.get_results(&fetch_id).await });
        // The reply must reach the inbox even when the fetch task dies, or
        // `fetches_in_flight` never drains.
        tokio::spawn(async move {
            let result = fetch.await.unwrap_or_else(|join_err| {
                Err(ApiError::Network(format!("results fetch aborted: {join_err}")))
            });
            let _ = inbox.send(ControllerInput::Results { session_id, result });
        });
    }

    fn handle_results(
        &mut self,
        session_id: &SessionId,
        result: Result<DebateOutcome, ApiError>,
    ) -> Update {
        let current = self.session_id() == Some(session_id)
            && self.status == LifecycleStatus::Completed
            && self.results == ResultsState::Pending;
        if !current {
            warn!(session_id = %session_id, "dropping stale results");
            return Update::Ignored;
        }

        match result {
            Ok(outcome) => {
                info!(
                    session_id = %session_id,
                    predictions = outcome.final_predictions.len(),
                    "results received"
                );
                self.results = ResultsState::Ready(outcome);
                Update::ResultsReady
            }
            Err(e) => {
                let err = DebateError::ResultsFetchFailure(e.to_string());
                warn!(session_id = %session_id, error = %err, "results unavailable");
                self.results = ResultsState::Failed(err.to_string());
                Update::ResultsFailed(err.to_string())
            }
        }
    }

    fn close_subscription(&mut self, reason: &'static str) {
        if let Some(mut dispatcher) = self.subscription.take() {
            if dispatcher.close() {
                info!(session_id = %dispatcher.session_id(), reason, "subscription closed");
            }
        }
    }

    fn transition(&mut self, to: LifecycleStatus) {
        if self.status != to {
            info!(from = %self.status, to = %to, "lifecycle transition");
        }
        self.status = to;
        debug_assert_eq!(
            self.subscription.is_some(),
            to == LifecycleStatus::Streaming,
            "subscription must exist exactly while streaming"
        );
    }
}

impl Drop for DebateController {
    fn drop(&mut self) {
        self.close_subscription("teardown");
    }
}

async fn next_event(subscription: &mut Option<Dispatcher>) -> Option<DebateEvent> {
    match subscription {
        Some(dispatcher) => dispatcher.next().await,
        None => std::future::pending().await,
    }
}
