use crate::lifecycle::LifecycleStatus;

/// Transport-level failures from the session API.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    /// Non-2xx reply. `message` is the server's own text, kept verbatim.
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl ApiError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network_error",
            Self::Status { .. } => "http_status",
            Self::Decode(_) => "decode_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
        }
    }

    /// Build a status error from a reply body, preferring the server's
    /// `error` or `message` field over the raw text.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                ["error", "message", "detail"]
                    .iter()
                    .find_map(|key| v.get(key).and_then(|m| m.as_str()).map(str::to_owned))
            })
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("request failed with status {status}")
                } else {
                    trimmed.to_owned()
                }
            });
        Self::Status { status, message }
    }
}

/// Selection and parameter problems caught before any network call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("select at least one participant")]
    NoParticipants,
    #[error("at most {max} participants can debate, got {count}")]
    TooManyParticipants { count: usize, max: usize },
    #[error("participant {0} selected more than once")]
    DuplicateParticipant(String),
    #[error("rounds must be between {min} and {max}, got {rounds}")]
    RoundsOutOfRange { rounds: u32, min: u32, max: u32 },
}

/// Every failure the lifecycle controller can record.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DebateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Start call rejected or unreachable. Text is surfaced verbatim.
    #[error("{0}")]
    StartFailure(String),
    #[error("{0}")]
    StreamFailure(String),
    /// Debate finished but the verdict could not be loaded.
    #[error("{0}")]
    ResultsFetchFailure(String),
    #[error("cannot {action} while {status}")]
    InvalidState {
        action: &'static str,
        status: LifecycleStatus,
    },
}

impl DebateError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::StartFailure(_) => "start_failure",
            Self::StreamFailure(_) => "stream_failure",
            Self::ResultsFetchFailure(_) => "results_fetch_failure",
            Self::InvalidState { .. } => "invalid_state",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_prefers_error_field() {
        let err = ApiError::from_status(400, r#"{"error":"market 42 is closed"}"#);
        assert_eq!(
            err,
            ApiError::Status {
                status: 400,
                message: "market 42 is closed".into()
            }
        );
        assert_eq!(err.to_string(), "market 42 is closed");
    }

    #[test]
    fn status_error_falls_back_to_message_field() {
        let err = ApiError::from_status(422, r#"{"message":"rounds must be <= 5"}"#);
        assert_eq!(err.to_string(), "rounds must be <= 5");
    }

    #[test]
    fn status_error_keeps_plain_body() {
        let err = ApiError::from_status(502, "  Bad Gateway\n");
        assert_eq!(err.to_string(), "Bad Gateway");
    }

    #[test]
    fn status_error_empty_body() {
        let err = ApiError::from_status(503, "");
        assert_eq!(err.to_string(), "request failed with status 503");
    }

    #[test]
    fn start_failure_is_verbatim() {
        let err = DebateError::StartFailure("Invalid model: foo".into());
        assert_eq!(err.to_string(), "Invalid model: foo");
        assert_eq!(err.error_kind(), "start_failure");
    }

    #[test]
    fn validation_messages() {
        let err: DebateError = ValidationError::TooManyParticipants { count: 5, max: 4 }.into();
        assert_eq!(err.to_string(), "at most 4 participants can debate, got 5");
        assert_eq!(err.error_kind(), "validation");
    }

    #[test]
    fn invalid_state_message() {
        let err = DebateError::InvalidState {
            action: "start",
            status: LifecycleStatus::Streaming,
        };
        assert_eq!(err.to_string(), "cannot start while streaming");
    }

    #[test]
    fn api_error_kinds() {
        assert_eq!(ApiError::Network("x".into()).error_kind(), "network_error");
        assert_eq!(
            ApiError::StreamInterrupted("eof".into()).error_kind(),
            "stream_interrupted"
        );
    }
}
