//! # debate-settings
//!
//! Configuration for the debate client, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`DebateSettings::default()`]
//! 2. **User file**: `~/.polydebate/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `POLYDEBATE_*` overrides (highest priority)
//!
//! The merged result is validated before it is handed out.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
