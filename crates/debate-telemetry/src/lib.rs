//! Tracing setup for the `polydebate` binary.
//!
//! Everything is written to stderr; stdout carries the debate transcript.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Crates that are chatty at `debug` and rarely useful below `warn`.
const NOISY_TARGETS: [&str; 3] = ["hyper", "hyper_util", "reqwest"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    /// One JSON object per line, span list included.
    Json,
}

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub level: Level,
    pub format: LogFormat,
    /// `(target, level)` directives appended after the base level.
    pub targets: Vec<(String, Level)>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            targets: NOISY_TARGETS
                .iter()
                .map(|target| ((*target).to_owned(), Level::WARN))
                .collect(),
        }
    }
}

impl TelemetryConfig {
    /// `level` is parsed leniently; anything unrecognised means INFO.
    pub fn from_level_str(level: &str, json: bool) -> Self {
        Self {
            level: level.trim().parse().unwrap_or(Level::INFO),
            format: if json { LogFormat::Json } else { LogFormat::Compact },
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>, level: Level) -> Self {
        let target = target.into();
        self.targets.retain(|(existing, _)| *existing != target);
        self.targets.push((target, level));
        self
    }

    /// Directive string used when `RUST_LOG` is not set.
    pub fn directives(&self) -> String {
        let mut parts = vec![lower(self.level)];
        parts.extend(
            self.targets
                .iter()
                .map(|(target, level)| format!("{target}={}", lower(*level))),
        );
        parts.join(",")
    }
}

fn lower(level: Level) -> String {
    level.as_str().to_ascii_lowercase()
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("logging already initialised: {0}")]
    AlreadyInitialized(String),
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `config`.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(raw) if !raw.trim().is_empty() => EnvFilter::try_new(raw),
        _ => EnvFilter::try_new(config.directives()),
    }
    .map_err(|err| TelemetryError::Filter(err.to_string()))?;

    let output = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let layer = match config.format {
        LogFormat::Compact => output.compact().boxed(),
        LogFormat::Json => output.json().with_span_list(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInitialized(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_quiet_the_http_stack() {
        assert_eq!(
            TelemetryConfig::default().directives(),
            "info,hyper=warn,hyper_util=warn,reqwest=warn"
        );
    }

    #[test]
    fn target_override_replaces_existing_entry() {
        let config = TelemetryConfig::default()
            .with_target("reqwest", Level::DEBUG)
            .with_target("debate_engine", Level::TRACE);
        assert_eq!(
            config.directives(),
            "info,hyper=warn,hyper_util=warn,reqwest=debug,debate_engine=trace"
        );
    }

    #[test]
    fn from_level_str_is_lenient() {
        assert_eq!(TelemetryConfig::from_level_str("debug", false).level, Level::DEBUG);
        assert_eq!(TelemetryConfig::from_level_str(" WARN ", false).level, Level::WARN);
        assert_eq!(TelemetryConfig::from_level_str("loud", false).level, Level::INFO);
        assert_eq!(TelemetryConfig::from_level_str("info", true).format, LogFormat::Json);
    }

    #[test]
    fn second_init_is_rejected() {
        let config = TelemetryConfig::default();
        let _ = init_telemetry(&config);
        assert!(matches!(
            init_telemetry(&config),
            Err(TelemetryError::AlreadyInitialized(_))
        ));
    }
}
