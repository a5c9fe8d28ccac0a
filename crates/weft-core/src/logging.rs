//! `tracing` subscriber setup.
//!
//! Call [`init_logging`] once at startup. `RUST_LOG`, when set, wins over the
//! configured level.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Logging options.
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Default filter directive, e.g. `info` or `weft_runtime=debug,info`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Build the filter: `RUST_LOG` first, then the configured directive, then `info`.
#[must_use]
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed (tests, embedding
/// hosts); that is not an error.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = build_filter(config);
    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_directive_falls_back() {
        // Must not panic; exact rendering depends on RUST_LOG.
        let _filter = build_filter(&LogConfig {
            level: "not a [valid directive".into(),
            json: false,
        });
    }

    #[test]
    fn second_init_is_harmless() {
        let config = LogConfig::default();
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
