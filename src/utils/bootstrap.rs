//! Bootstrap utilities for word-splitter binaries.
//!
//! Shared initialization code for the producer and consumer binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Default filter when `WORD_SPLITTER_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Build the log filter from `WORD_SPLITTER_LOG`.
///
/// Defaults to "info" if WORD_SPLITTER_LOG is not set.
pub fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Initialize tracing with the WORD_SPLITTER_LOG environment variable.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
