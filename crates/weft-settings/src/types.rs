//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a partial JSON file only needs the keys it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_core::logging::LogConfig;

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// Example user file:
///
/// ```json
/// {
///   "runtime": { "maxTurns": 20 },
///   "pool": { "capacity": 3 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeftSettings {
    /// Orchestration-loop limits and timeouts.
    pub runtime: RuntimeSettings,
    /// Sub-agent pool sizing.
    pub pool: PoolSettings,
    /// Delegation tool behavior.
    pub delegation: DelegationSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl WeftSettings {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.max_turns == 0 {
            return Err(SettingsError::InvalidValue(
                "runtime.maxTurns must be at least 1".into(),
            ));
        }
        if self.runtime.model_timeout_ms == 0 || self.runtime.tool_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "runtime timeouts must be greater than 0".into(),
            ));
        }
        if self.pool.capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "pool.capacity must be at least 1".into(),
            ));
        }
        if self.delegation.tool_name.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "delegation.toolName must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Orchestration-loop settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Model round-trips allowed per run before stopping with `MaxTurns`.
    pub max_turns: u32,
    /// Budget for one model call, in milliseconds.
    pub model_timeout_ms: u64,
    /// Budget for one tool call, in milliseconds.
    pub tool_timeout_ms: u64,
    /// Retry a timed-out model call instead of failing the run.
    pub continue_after_timeout: bool,
    /// How many timed-out model calls may be retried per run.
    pub max_timeout_retries: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_turns: 50,
            model_timeout_ms: 300_000,
            tool_timeout_ms: 120_000,
            continue_after_timeout: true,
            max_timeout_retries: 1,
        }
    }
}

impl RuntimeSettings {
    /// Model-call budget.
    #[must_use]
    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    /// Tool-call budget.
    #[must_use]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

/// Sub-agent pool settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolSettings {
    /// Maximum number of pooled agents alive at once.
    pub capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { capacity: 5 }
    }
}

/// Delegation tool settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelegationSettings {
    /// Deepest allowed nesting of delegated agents (top level is 0).
    pub max_depth: u32,
    /// Name the model uses to call the delegation tool.
    pub tool_name: String,
}

impl Default for DelegationSettings {
    fn default() -> Self {
        Self {
            max_depth: 2,
            tool_name: "agent".into(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `weft_runtime=debug,info`.
    pub level: String,
    /// Emit JSON lines.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl LoggingSettings {
    /// Convert into the subscriber configuration.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level.clone(),
            json: self.json,
        }
    }
}
