//! Errors raised by the external collaborators.
//!
//! Neither type represents cancellation of the agent loop: a cancelled step is
//! a control-flow outcome read from the interruption state, not an error.

use std::time::Duration;

use thiserror::Error;

/// Failure of a model-client call.
#[derive(Clone, Debug, Error)]
pub enum ProviderError {
    /// Credentials rejected.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    /// Request rejected as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Rate limited by the provider.
    #[error("rate limited")]
    RateLimited {
        /// Provider-suggested backoff.
        retry_after: Option<Duration>,
    },
    /// 5xx from the provider.
    #[error("server error {status}: {body}")]
    ServerError {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
    },
    /// Transport failure.
    #[error("network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Network(_)
        )
    }

    /// Short classification string for logging.
    #[must_use]
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::Network(_) => "network_error",
        }
    }
}

/// Truly exceptional tool failure.
///
/// User-facing failures (file not found, bad edit) are reported through a
/// failed [`ToolOutcome`](crate::tools::ToolOutcome) instead.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments could not be interpreted.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// No tool with this name is registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// The tool crashed or its backend failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// The tool exceeded its time budget.
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}
