//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial JSON
//! files are accepted; missing fields keep their compiled default.

use std::time::Duration;

use debate_core::lifecycle::{MAX_ROUNDS, MIN_ROUNDS};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "api": { "baseUrl": "https://debate.example.com" },
///   "stream": { "idleTimeoutMs": 60000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebateSettings {
    /// Session API endpoint and HTTP timeouts.
    pub api: ApiSettings,
    /// Push-stream watchdog and malformed-payload tolerance.
    pub stream: StreamSettings,
    /// Defaults for new debates.
    pub debate: DebateDefaults,
    /// Log output.
    pub logging: LoggingSettings,
}

impl DebateSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        if url.is_empty() {
            return Err(SettingsError::invalid("api.baseUrl", "must not be empty"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SettingsError::invalid(
                "api.baseUrl",
                format!("expected an http(s) URL, got {url}"),
            ));
        }
        if self.stream.max_consecutive_malformed == 0 {
            return Err(SettingsError::invalid(
                "stream.maxConsecutiveMalformed",
                "must be at least 1",
            ));
        }
        if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&self.debate.default_rounds) {
            return Err(SettingsError::invalid(
                "debate.defaultRounds",
                format!(
                    "must be between {MIN_ROUNDS} and {MAX_ROUNDS}, got {}",
                    self.debate.default_rounds
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Base URL of the debate backend, without a trailing slash.
    pub base_url: String,
    pub connect_timeout_ms: u64,
    /// Timeout for plain request/response calls. Not applied to the push stream.
    pub request_timeout_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl ApiSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// Longest gap between frames before the stream counts as dead. `0` disables.
    pub idle_timeout_ms: u64,
    /// Consecutive undecodable payloads tolerated before the stream is failed.
    pub max_consecutive_malformed: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 120_000,
            max_consecutive_malformed: 3,
        }
    }
}

impl StreamSettings {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebateDefaults {
    pub default_rounds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_market: Option<String>,
}

impl Default for DebateDefaults {
    fn default() -> Self {
        Self {
            default_rounds: 3,
            default_market: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter. `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
