//! # weft-settings
//!
//! Layered configuration for the weft agent core.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. **Compiled defaults**: [`WeftSettings::default()`]
//! 2. **User file**: `~/.weft/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `WEFT_*` overrides (highest priority)
//!
//! There is no process-wide singleton. Load once at startup and pass the
//! relevant section into each component's constructor.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{DelegationSettings, LoggingSettings, PoolSettings, RuntimeSettings, WeftSettings};
