use std::pin::Pin;

use futures::Stream;

use crate::errors::ApiError;

/// One server-sent event: its `event:` name and raw `data:` payload.
///
/// A frame with an empty event name is a heartbeat: bytes arrived (a
/// `: keep-alive` comment, or part of a frame still being buffered) but no
/// event is complete yet. Framing always names real events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::new("", "")
    }

    pub fn is_heartbeat(&self) -> bool {
        self.event.is_empty()
    }
}

/// Raw frames from a push-stream subscription, in wire order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseFrame, ApiError>> + Send>>;
