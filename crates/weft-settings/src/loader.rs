//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WeftSettings::default()`]
//! 2. If `~/.weft/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `WEFT_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::WeftSettings;

/// Resolve the path to the settings file (`~/.weft/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".weft").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WeftSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// [`WeftSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<WeftSettings> {
    let defaults = serde_json::to_value(WeftSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WeftSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `WEFT_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut WeftSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Anything else is logged
/// and ignored, leaving the file/default value in place.
pub fn apply_overrides_from<F>(settings: &mut WeftSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.u32("WEFT_MAX_TURNS", 1, 10_000) {
        settings.runtime.max_turns = v;
    }
    if let Some(v) = env.u64("WEFT_MODEL_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.runtime.model_timeout_ms = v;
    }
    if let Some(v) = env.u64("WEFT_TOOL_TIMEOUT_MS", 100, 3_600_000) {
        settings.runtime.tool_timeout_ms = v;
    }
    if let Some(v) = env.bool("WEFT_CONTINUE_AFTER_TIMEOUT") {
        settings.runtime.continue_after_timeout = v;
    }
    if let Some(v) = env.u64("WEFT_POOL_CAPACITY", 1, 1_000) {
        if let Ok(v) = usize::try_from(v) {
            settings.pool.capacity = v;
        }
    }
    if let Some(v) = env.u32("WEFT_DELEGATION_MAX_DEPTH", 0, 16) {
        settings.delegation.max_depth = v;
    }
    if let Some(v) = env.string("WEFT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("WEFT_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.u64(name, u64::from(min), u64::from(max))
            .and_then(|v| u32::try_from(v).ok())
    }
}
