use serde::{Deserialize, Serialize};

use crate::ids::ParticipantId;

/// A model that can be entered into a debate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    #[serde(default)]
    pub provider: String,
    /// Only eligible participants may be selected.
    #[serde(default = "default_true", alias = "supported", alias = "available")]
    pub eligible: bool,
    /// Display-only badge.
    #[serde(default, alias = "is_free")]
    pub free_tier: bool,
}

fn default_true() -> bool {
    true
}

/// Reply shape of the participant listing endpoint. Both a bare array and
/// a `{"models": [...]}` envelope are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ParticipantListing {
    Wrapped { models: Vec<Participant> },
    Bare(Vec<Participant>),
}

impl ParticipantListing {
    pub fn into_vec(self) -> Vec<Participant> {
        match self {
            Self::Wrapped { models } => models,
            Self::Bare(models) => models,
        }
    }
}

/// Keep eligible participants, preserving listing order.
pub fn eligible_only(participants: Vec<Participant>) -> Vec<Participant> {
    participants.into_iter().filter(|p| p.eligible).collect()
}
