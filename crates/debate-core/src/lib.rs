//! # debate-core
//!
//! Shared vocabulary for the debate client crates:
//!
//! - **Branded IDs**: [`ids::SessionId`], [`ids::ParticipantId`]
//! - **Participants and markets**: [`participant::Participant`], [`market::MarketDetail`]
//! - **Transcript and verdict**: [`events::DebateTurn`], [`outcome::DebateOutcome`]
//! - **Wire events**: [`events::DebateEvent`] decoded from [`stream::SseFrame`]
//! - **Lifecycle**: [`lifecycle::LifecycleStatus`] and selection limits
//! - **Errors**: [`errors::ApiError`], [`errors::DebateError`]
//! - **API seam**: [`api::DebateApi`]

pub mod api;
pub mod errors;
pub mod events;
pub mod ids;
pub mod lifecycle;
pub mod market;
pub mod outcome;
pub mod participant;
pub mod stream;
