use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ParticipantId, SessionId};
use crate::stream::SseFrame;

/// Event names emitted by the debate push stream.
pub mod names {
    pub const DEBATE_STARTED: &str = "debate_started";
    pub const MODEL_THINKING: &str = "model_thinking";
    pub const MESSAGE: &str = "message";
    pub const ROUND_COMPLETE: &str = "round_complete";
    pub const DEBATE_COMPLETE: &str = "debate_complete";
    pub const ERROR: &str = "error";
}

/// Typed push-stream events. Strict ordering contract:
///
/// DebateStarted → (ModelThinking | Message | RoundComplete)* → DebateComplete
///
/// StreamError can appear at any point.
#[derive(Clone, Debug, PartialEq)]
pub enum DebateEvent {
    DebateStarted(DebateStarted),
    ModelThinking(ModelThinking),
    Message(DebateTurn),
    RoundComplete(RoundComplete),
    DebateComplete(DebateComplete),
    StreamError(StreamFailure),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateStarted {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub rounds: Option<u32>,
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelThinking {
    #[serde(default)]
    pub model_id: Option<ParticipantId>,
    pub model_name: String,
}

impl ModelThinking {
    /// Key used for the pending indicator: the id when sent, else the name.
    pub fn participant_key(&self) -> &str {
        self.model_id
            .as_ref()
            .map_or(self.model_name.as_str(), ParticipantId::as_str)
    }
}

/// One participant utterance within a round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebateTurn {
    #[serde(default)]
    pub model_id: Option<ParticipantId>,
    pub model_name: String,
    pub round: u32,
    /// Server-owned turn kind, e.g. "opening", "rebuttal", "closing".
    pub message_type: String,
    pub text: String,
    /// Outcome label → predicted percentage.
    #[serde(default)]
    pub predictions: BTreeMap<String, f64>,
}

impl DebateTurn {
    pub fn participant_key(&self) -> &str {
        self.model_id
            .as_ref()
            .map_or(self.model_name.as_str(), ParticipantId::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundComplete {
    pub round: u32,
    #[serde(default)]
    pub next_round: Option<u32>,
}

impl RoundComplete {
    /// The round the debate moves to. Without an explicit `next_round`
    /// the debate moves to `round + 1`.
    pub fn resolved_next_round(&self) -> u32 {
        self.next_round.unwrap_or_else(|| self.round.saturating_add(1))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateComplete {
    pub total_rounds: u32,
}

/// Why the stream reported a failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Server sent an `error` event.
    Server,
    /// Payload did not decode. Carries the current run of consecutive failures.
    Malformed { consecutive: u32 },
    /// Transport error while reading the stream.
    Transport,
    /// Stream ended before `debate_complete`.
    Closed,
    /// No frame within the idle window.
    IdleTimeout,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Fatal failures end the session.
    pub fatal: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("malformed '{event}' payload: {reason}")]
    InvalidPayload { event: String, reason: String },
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl DebateEvent {
    /// Decode a raw frame by its declared event name.
    pub fn decode(frame: &SseFrame) -> Result<Self, DecodeError> {
        let event = frame.event.as_str();
        match event {
            names::DEBATE_STARTED => {
                // Payload is informational; an empty body is fine.
                if frame.data.trim().is_empty() {
                    return Ok(Self::DebateStarted(DebateStarted::default()));
                }
                parse(event, &frame.data).map(Self::DebateStarted)
            }
            names::MODEL_THINKING => parse(event, &frame.data).map(Self::ModelThinking),
            names::MESSAGE => parse(event, &frame.data).map(Self::Message),
            names::ROUND_COMPLETE => parse(event, &frame.data).map(Self::RoundComplete),
            names::DEBATE_COMPLETE => parse(event, &frame.data).map(Self::DebateComplete),
            names::ERROR => Ok(Self::StreamError(StreamFailure {
                kind: FailureKind::Server,
                message: server_error_message(&frame.data),
                fatal: true,
            })),
            other => Err(DecodeError::UnknownEvent(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DebateStarted(_) => names::DEBATE_STARTED,
            Self::ModelThinking(_) => names::MODEL_THINKING,
            Self::Message(_) => names::MESSAGE,
            Self::RoundComplete(_) => names::ROUND_COMPLETE,
            Self::DebateComplete(_) => names::DEBATE_COMPLETE,
            Self::StreamError(_) => names::ERROR,
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(event: &str, data: &str) -> Result<T, DecodeError> {
    serde_json::from_str(data).map_err(|e| DecodeError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

fn server_error_message(data: &str) -> String {
    serde_json::from_str::<ErrorPayload>(data)
        .ok()
        .and_then(|p| p.message.or(p.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let raw = data.trim();
            if raw.is_empty() {
                "debate failed on the server".to_string()
            } else {
                raw.to_string()
            }
        })
}
