use debate_core::events::DebateTurn;

/// Append-only transcript plus the highest round advance seen.
///
/// Never reused across sessions; a reset builds a fresh one.
#[derive(Debug, Default)]
pub struct RoundTracker {
    transcript: Vec<DebateTurn>,
    current_round: u32,
}

impl RoundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a turn in arrival order. Does not touch the round counter.
    pub fn append(&mut self, turn: DebateTurn) {
        self.transcript.push(turn);
    }

    /// Move the round counter to `round` unless it is already further along.
    /// Returns the counter after the update.
    pub fn advance_to(&mut self, round: u32) -> u32 {
        self.current_round = self.current_round.max(round);
        self.current_round
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn transcript(&self) -> &[DebateTurn] {
        &self.transcript
    }

    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn turn(name: &str, round: u32) -> DebateTurn {
        DebateTurn {
            model_id: None,
            model_name: name.into(),
            round,
            message_type: "initial".into(),
            text: format!("{name} speaks in round {round}"),
            predictions: BTreeMap::new(),
        }
    }

    #[test]
    fn starts_empty_at_round_zero() {
        let tracker = RoundTracker::new();
        assert!(tracker.is_empty());
        assert_eq!(tracker.current_round(), 0);
    }

    #[test]
    fn append_preserves_arrival_order() {
        let mut tracker = RoundTracker::new();
        tracker.append(turn("B", 2));
        tracker.append(turn("A", 1));
        tracker.append(turn("A", 1));

        let order: Vec<(&str, u32)> = tracker
            .transcript()
            .iter()
            .map(|t| (t.model_name.as_str(), t.round))
            .collect();
        assert_eq!(order, vec![("B", 2), ("A", 1), ("A", 1)]);
        assert_eq!(tracker.current_round(), 0);
    }

    #[test]
    fn advance_never_goes_back() {
        let mut tracker = RoundTracker::new();
        assert_eq!(tracker.advance_to(2), 2);
        assert_eq!(tracker.advance_to(1), 2);
        assert_eq!(tracker.advance_to(3), 3);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn round_is_monotonic(advances in proptest::collection::vec(0u32..10, 0..50)) {
                let mut tracker = RoundTracker::new();
                let mut previous = tracker.current_round();
                for next in advances {
                    let now = tracker.advance_to(next);
                    prop_assert!(now >= previous);
                    prop_assert!(now >= next);
                    previous = now;
                }
            }

            #[test]
            fn transcript_keeps_every_turn(rounds in proptest::collection::vec(1u32..6, 0..30)) {
                let mut tracker = RoundTracker::new();
                for (i, round) in rounds.iter().enumerate() {
                    tracker.append(turn(&format!("m{i}"), *round));
                }
                prop_assert_eq!(tracker.len(), rounds.len());
                let seen: Vec<u32> = tracker.transcript().iter().map(|t| t.round).collect();
                prop_assert_eq!(seen, rounds);
            }
        }
    }
}
