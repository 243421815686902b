use std::fmt;

use serde::{Deserialize, Serialize};

/// Most participants a single debate accepts.
pub const MAX_PARTICIPANTS: usize = 4;
pub const MIN_ROUNDS: u32 = 1;
pub const MAX_ROUNDS: u32 = 5;

/// Debate session lifecycle.
///
/// Setup → Starting → Streaming → (Completed | Error), with reset back to
/// Setup from anywhere. Completed and Error are terminal for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Setup,
    Starting,
    Streaming,
    Completed,
    Error,
}

impl LifecycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&LifecycleStatus::Streaming).unwrap();
        assert_eq!(json, "\"streaming\"");
    }
}
