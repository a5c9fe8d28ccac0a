//! Runtime error types.
//!
//! Cancellation is not here: an interrupted run ends with
//! [`StopReason::Interrupted`](crate::types::StopReason::Interrupted).

use std::time::Duration;

use thiserror::Error;
use weft_context::ContextError;
use weft_core::errors::ProviderError;
use weft_core::ids::AgentId;
use weft_settings::SettingsError;

/// Errors that end an agent run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The model client failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The model call timed out and retrying was not allowed.
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    /// Settings failed validation.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// A conversation edit was rejected.
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// Another run already holds this agent.
    #[error("Agent busy: {0}")]
    AgentBusy(AgentId),

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Whether the user can simply retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Timeout(_) | Self::AgentBusy(_) => true,
            Self::Settings(_) | Self::Context(_) | Self::Internal(_) => false,
        }
    }

    /// Category string for event payloads.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider",
            Self::Timeout(_) => "timeout",
            Self::Settings(_) => "settings",
            Self::Context(_) => "context",
            Self::AgentBusy(_) => "agent_busy",
            Self::Internal(_) => "internal",
        }
    }
}

/// Why the pool could not hand out an agent.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Every entry is acquired, so nothing can be evicted.
    #[error("agent pool exhausted: all {capacity} agents are in use")]
    Exhausted {
        /// Pool capacity.
        capacity: usize,
    },
    /// The entry under this key is already acquired.
    #[error("pooled agent for key {key} is already in use")]
    KeyBusy {
        /// Requested pool key.
        key: String,
    },
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
