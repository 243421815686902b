use std::collections::HashSet;

use debate_core::errors::ValidationError;
use debate_core::ids::ParticipantId;
use debate_core::lifecycle::{MAX_PARTICIPANTS, MAX_ROUNDS, MIN_ROUNDS};

/// Ordered participant picks, capped at [`MAX_PARTICIPANTS`] with no duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParticipantSelection {
    ids: Vec<ParticipantId>,
}

impl ParticipantSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` at the end. A duplicate or an add beyond the cap is a no-op;
    /// returns whether the selection changed.
    pub fn add(&mut self, id: ParticipantId) -> bool {
        if self.is_full() || self.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub fn remove(&mut self, id: &ParticipantId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() != before
    }

    /// Flip membership. Returns whether `id` is selected afterwards.
    pub fn toggle(&mut self, id: ParticipantId) -> bool {
        if self.remove(&id) {
            return false;
        }
        self.add(id.clone());
        self.contains(&id)
    }

    /// Keep only the picks for which `keep` holds, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&ParticipantId) -> bool) {
        self.ids.retain(keep);
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> &[ParticipantId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ids.len() >= MAX_PARTICIPANTS
    }
}

/// Check a start request before anything goes over the wire.
pub fn validate_start(participants: &[ParticipantId], rounds: u32) -> Result<(), ValidationError> {
    if participants.is_empty() {
        return Err(ValidationError::NoParticipants);
    }
    if participants.len() > MAX_PARTICIPANTS {
        return Err(ValidationError::TooManyParticipants {
            count: participants.len(),
            max: MAX_PARTICIPANTS,
        });
    }
    let mut seen = HashSet::with_capacity(participants.len());
    for id in participants {
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateParticipant(id.to_string()));
        }
    }
    if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&rounds) {
        return Err(ValidationError::RoundsOutOfRange {
            rounds,
            min: MIN_ROUNDS,
            max: MAX_ROUNDS,
        });
    }
    Ok(())
}
