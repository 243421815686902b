//! # debate-engine
//!
//! Client-side lifecycle of one debate session:
//! - [`controller`]: the Setup → Starting → Streaming → Completed/Error state machine
//! - [`dispatcher`]: owns the push-stream subscription and decodes frames into events
//! - [`tracker`]: append-only transcript and monotonic round counter
//! - [`selection`]: bounded participant selection and start validation

pub mod controller;
pub mod dispatcher;
pub mod selection;
pub mod tracker;

pub use controller::{DebateController, ResultsState, Update};
pub use dispatcher::{Dispatcher, StreamConfig};
pub use selection::{validate_start, ParticipantSelection};
pub use tracker::RoundTracker;
