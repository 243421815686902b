//! Layered settings resolution.
//!
//! Compiled defaults are serialized to JSON, the user file is folded over them
//! key by key, and `POLYDEBATE_*` variables are applied last to the typed
//! value. A `null` in the file leaves the underlying default in place; arrays
//! and scalars replace wholesale.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::DebateSettings;

const SETTINGS_DIR: &str = ".polydebate";
const SETTINGS_FILE: &str = "settings.json";

/// `~/.polydebate/settings.json`, falling back to the temp dir without `$HOME`.
pub fn settings_path() -> PathBuf {
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    base.join(SETTINGS_DIR).join(SETTINGS_FILE)
}

pub fn load_settings() -> Result<DebateSettings> {
    load_settings_from_path(&settings_path())
}

/// Resolve settings with `path` as the user file and the process environment
/// as the override layer. A missing file is not an error.
pub fn load_settings_from_path(path: &Path) -> Result<DebateSettings> {
    resolve(path, |key| std::env::var(key).ok())
}

fn resolve(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<DebateSettings> {
    let mut document = serde_json::to_value(DebateSettings::default())?;
    if let Some(user) = read_user_file(path)? {
        merge_into(&mut document, user);
    }
    let mut settings: DebateSettings = serde_json::from_value(document)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

fn read_user_file(path: &Path) -> Result<Option<Value>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file");
            return Ok(None);
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    debug!(path = %path.display(), "merging settings file");
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Fold `overlay` into `base` and return the result.
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(slots), Value::Object(incoming)) => merge_maps(slots, incoming),
        (_, Value::Null) => {}
        (slot, value) => *slot = value,
    }
}

fn merge_maps(slots: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        if value.is_null() {
            continue;
        }
        match slots.get_mut(&key) {
            Some(slot) => merge_into(slot, value),
            None => {
                slots.insert(key, value);
            }
        }
    }
}

/// Apply `POLYDEBATE_*` overrides read through `lookup`. Empty values count
/// as unset; values that do not parse or fall outside their bounds are logged
/// and skipped.
pub fn apply_overrides(settings: &mut DebateSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Overrides { lookup };

    if let Some(url) = env.text("POLYDEBATE_API_URL") {
        settings.api.base_url = url.trim_end_matches('/').to_owned();
    }
    if let Some(ms) = env.bounded("POLYDEBATE_CONNECT_TIMEOUT_MS", 100, 300_000) {
        settings.api.connect_timeout_ms = ms;
    }
    if let Some(ms) = env.bounded("POLYDEBATE_REQUEST_TIMEOUT_MS", 100, 600_000) {
        settings.api.request_timeout_ms = ms;
    }
    if let Some(ms) = env.bounded("POLYDEBATE_STREAM_IDLE_TIMEOUT_MS", 0, 3_600_000) {
        settings.stream.idle_timeout_ms = ms;
    }
    if let Some(limit) = env.bounded("POLYDEBATE_MAX_MALFORMED", 1, 100) {
        settings.stream.max_consecutive_malformed = limit as u32;
    }
    if let Some(rounds) = env.bounded("POLYDEBATE_DEFAULT_ROUNDS", 1, 5) {
        settings.debate.default_rounds = rounds as u32;
    }
    if let Some(market) = env.text("POLYDEBATE_MARKET") {
        settings.debate.default_market = Some(market);
    }
    if let Some(level) = env.text("POLYDEBATE_LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Some(json) = env.flag("POLYDEBATE_LOG_JSON") {
        settings.logging.json = json;
    }
}

struct Overrides<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Overrides<F> {
    fn text(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.is_empty())
    }

    fn flag(&self, key: &str) -> Option<bool> {
        let raw = self.text(key)?;
        parse_bool(&raw).or_else(|| {
            warn!(key, value = %raw, "ignoring non-boolean override");
            None
        })
    }

    fn bounded(&self, key: &str, min: u64, max: u64) -> Option<u64> {
        let raw = self.text(key)?;
        parse_u64_range(&raw, min, max).or_else(|| {
            warn!(key, value = %raw, min, max, "ignoring out-of-range override");
            None
        })
    }
}

/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    const YES: [&str; 4] = ["true", "1", "yes", "on"];
    const NO: [&str; 4] = ["false", "0", "no", "off"];
    let raw = raw.trim();
    if YES.iter().any(|word| raw.eq_ignore_ascii_case(word)) {
        Some(true)
    } else if NO.iter().any(|word| raw.eq_ignore_ascii_case(word)) {
        Some(false)
    } else {
        None
    }
}

pub fn parse_u64_range(raw: &str, min: u64, max: u64) -> Option<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|n| (min..=max).contains(n))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn write_settings(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn merge_keeps_sibling_keys() {
        let merged = deep_merge(
            json!({"api": {"baseUrl": "a", "connectTimeoutMs": 1}}),
            json!({"api": {"baseUrl": "b"}}),
        );
        assert_eq!(merged, json!({"api": {"baseUrl": "b", "connectTimeoutMs": 1}}));
    }

    #[test]
    fn merge_skips_nulls_and_replaces_leaves() {
        let merged = deep_merge(
            json!({"a": 1, "list": [1, 2, 3], "nested": {"on": true}}),
            json!({"a": null, "list": [4], "nested": 42, "extra": "x"}),
        );
        assert_eq!(merged, json!({"a": 1, "list": [4], "nested": 42, "extra": "x"}));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let settings = resolve(Path::new("/nonexistent/settings.json"), env(&[])).unwrap();
        assert_eq!(settings.stream.max_consecutive_malformed, 3);
        assert_eq!(settings.debate.default_rounds, 3);
    }

    #[test]
    fn file_values_layer_over_defaults() {
        let (_dir, path) = write_settings(
            r#"{"stream": {"idleTimeoutMs": 30000}, "debate": {"defaultMarket": "16167"}}"#,
        );
        let settings = resolve(&path, env(&[])).unwrap();
        assert_eq!(settings.stream.idle_timeout_ms, 30_000);
        assert_eq!(settings.stream.max_consecutive_malformed, 3);
        assert_eq!(settings.debate.default_market.as_deref(), Some("16167"));
        assert_eq!(settings.debate.default_rounds, 3);
    }

    #[test]
    fn env_beats_file() {
        let (_dir, path) = write_settings(r#"{"api": {"baseUrl": "http://file:1"}}"#);
        let settings = resolve(
            &path,
            env(&[
                ("POLYDEBATE_API_URL", "http://env:2/"),
                ("POLYDEBATE_DEFAULT_ROUNDS", "5"),
                ("POLYDEBATE_LOG_JSON", "on"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.api.base_url, "http://env:2");
        assert_eq!(settings.debate.default_rounds, 5);
        assert!(settings.logging.json);
    }

    #[test]
    fn bad_env_values_are_skipped() {
        let settings = resolve(
            Path::new("/nonexistent/settings.json"),
            env(&[
                ("POLYDEBATE_DEFAULT_ROUNDS", "9"),
                ("POLYDEBATE_MAX_MALFORMED", "lots"),
                ("POLYDEBATE_LOG_JSON", "maybe"),
                ("POLYDEBATE_MARKET", ""),
            ]),
        )
        .unwrap();
        assert_eq!(settings.debate.default_rounds, 3);
        assert_eq!(settings.stream.max_consecutive_malformed, 3);
        assert!(!settings.logging.json);
        assert_eq!(settings.debate.default_market, None);
    }

    #[test]
    fn unparsable_file_names_the_path() {
        let (_dir, path) = write_settings("not valid json");
        match resolve(&path, env(&[])) {
            Err(SettingsError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_type_is_a_shape_error() {
        let (_dir, path) = write_settings(r#"{"debate": {"defaultRounds": "three"}}"#);
        assert!(matches!(resolve(&path, env(&[])), Err(SettingsError::Shape(_))));
    }

    #[test]
    fn out_of_range_file_value_fails_validation() {
        let (_dir, path) = write_settings(r#"{"debate": {"defaultRounds": 9}}"#);
        assert!(matches!(
            resolve(&path, env(&[])),
            Err(SettingsError::Invalid { field: "debate.defaultRounds", .. })
        ));
    }

    #[test]
    fn parse_bool_words() {
        for raw in ["true", "TRUE", "1", "yes", " on "] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_range_is_inclusive() {
        assert_eq!(parse_u64_range("5", 1, 5), Some(5));
        assert_eq!(parse_u64_range(" 3 ", 1, 5), Some(3));
        assert_eq!(parse_u64_range("6", 1, 5), None);
        assert_eq!(parse_u64_range("0", 1, 5), None);
        assert_eq!(parse_u64_range("-1", 0, 5), None);
        assert_eq!(parse_u64_range("abc", 0, 5), None);
    }
}
