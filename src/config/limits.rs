//! Processing limits and timeouts.
//!
//! Every wait in the pipeline is bounded by one of these values so that a
//! shutdown request is never blocked by a lack of external activity.

use std::time::Duration;

use serde::Deserialize;

/// Words longer than this (in characters) are dropped.
pub const DEFAULT_MAX_WORD_LENGTH: usize = 10;

/// File-processing workers per publisher.
pub const DEFAULT_WORKER_COUNT: usize = 1;

/// Bounded wait for watcher events and consumer polls.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Graceful wait for queued and running file jobs at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait after aborting workers that missed the graceful deadline.
pub const DEFAULT_FORCED_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Bound on the final flush of outstanding publishes.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Processing limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingLimits {
    /// Maximum word length in characters.
    pub max_word_length: usize,
    /// Worker pool size for file processing.
    pub worker_count: usize,
    /// Poll timeout in milliseconds.
    pub poll_timeout_ms: u64,
    /// Graceful shutdown timeout in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// Forced shutdown grace period in milliseconds.
    pub forced_shutdown_grace_ms: u64,
    /// Flush timeout in milliseconds.
    pub flush_timeout_ms: u64,
}

impl Default for ProcessingLimits {
    fn default() -> Self {
        Self {
            max_word_length: DEFAULT_MAX_WORD_LENGTH,
            worker_count: DEFAULT_WORKER_COUNT,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT.as_millis() as u64,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64,
            forced_shutdown_grace_ms: DEFAULT_FORCED_SHUTDOWN_GRACE.as_millis() as u64,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ProcessingLimits {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn forced_shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.forced_shutdown_grace_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// Limits with short timeouts for tests.
    pub fn for_test() -> Self {
        Self {
            poll_timeout_ms: 20,
            shutdown_timeout_ms: 2_000,
            forced_shutdown_grace_ms: 200,
            flush_timeout_ms: 1_000,
            ..Default::default()
        }
    }
}
