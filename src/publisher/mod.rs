//! File publisher.
//!
//! Turns each submitted file into one message per word, routed to the topic
//! named after the word's length, then deletes the file. Files are processed
//! on a [`WorkerPool`] so the watch loop never blocks on I/O.

mod pool;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::bus::{BusError, MessageBus};
use crate::config::ProcessingLimits;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::tokenize;
use crate::watcher::FileHandler;

pub use pool::{Job, PoolClosed, PoolShutdown, WorkerPool};

/// Per-file failures. The file is left in place.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to publish words from {}: {source}", .path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: BusError,
    },

    #[error("Failed to delete {}: {source}", .path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a file job did with its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Words published and the file deleted.
    Published { words: usize },
    /// Nothing to do: the entry vanished or is not a regular file.
    Skipped,
}

/// State shared between the publisher and its jobs.
struct Shared {
    bus: Arc<dyn MessageBus>,
    lifecycle: Lifecycle,
    max_word_length: usize,
}

impl Shared {
    async fn handle(&self, path: PathBuf) {
        if !self.lifecycle.is_running() {
            info!(path = %path.display(), "Publisher shutting down, leaving file in place");
            return;
        }

        match self.process_file(&path).await {
            Ok(FileOutcome::Published { words }) => {
                info!(path = %path.display(), words, "Published file")
            }
            Ok(FileOutcome::Skipped) => {}
            Err(e) => error!(path = %path.display(), error = %e, "File processing failed"),
        }
    }

    async fn process_file(&self, path: &Path) -> Result<FileOutcome, FileError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                debug!(path = %path.display(), "Not a regular file, skipping");
                return Ok(FileOutcome::Skipped);
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Entry vanished before processing");
                return Ok(FileOutcome::Skipped);
            }
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| FileError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut words = 0;
        for word in tokenize::words(&content, self.max_word_length) {
            let topic = tokenize::topic_for(word);
            self.bus
                .publish(&topic, word)
                .await
                .map_err(|source| FileError::Publish {
                    path: path.to_path_buf(),
                    source,
                })?;
            words += 1;
        }

        tokio::fs::remove_file(path)
            .await
            .map_err(|source| FileError::Delete {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(FileOutcome::Published { words })
    }
}

/// Publishes the words of submitted files.
pub struct FilePublisher {
    shared: Arc<Shared>,
    pool: WorkerPool,
    limits: ProcessingLimits,
    shutdown: OnceCell<()>,
}

impl FilePublisher {
    /// Create a publisher that owns `bus` until [`shutdown`](Self::shutdown).
    ///
    /// Must be called within a Tokio runtime; the worker pool starts here.
    pub fn new(bus: Arc<dyn MessageBus>, limits: &ProcessingLimits) -> Self {
        info!(
            workers = limits.worker_count,
            max_word_length = limits.max_word_length,
            "Starting file publisher"
        );
        Self {
            shared: Arc::new(Shared {
                bus,
                lifecycle: Lifecycle::new(),
                max_word_length: limits.max_word_length,
            }),
            pool: WorkerPool::new(limits.worker_count),
            limits: limits.clone(),
            shutdown: OnceCell::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    /// Queue `path` for publishing. Returns immediately.
    ///
    /// Rejected (and logged) once shutdown has started.
    pub fn submit(&self, path: PathBuf) {
        if !self.shared.lifecycle.is_running() {
            warn!(path = %path.display(), "Publisher not running, rejecting file");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let rejected = path.display().to_string();
        let job = async move { shared.handle(path).await }.boxed();
        if let Err(e) = self.pool.execute(job) {
            warn!(path = %rejected, error = %e, "Rejecting file");
        }
    }

    /// Process one file inline, bypassing the pool.
    pub async fn publish_file(&self, path: &Path) -> Result<FileOutcome, FileError> {
        self.shared.process_file(path).await
    }

    /// Drain the pool, flush and close the bus.
    ///
    /// Runs once; concurrent and later callers wait for that run to finish.
    pub async fn shutdown(&self) {
        self.shutdown
            .get_or_init(|| async {
                self.shared.lifecycle.begin_shutdown();
                info!("Shutting down file publisher");

                match self
                    .pool
                    .shutdown(
                        self.limits.shutdown_timeout(),
                        self.limits.forced_shutdown_grace(),
                    )
                    .await
                {
                    PoolShutdown::Graceful => debug!("All file jobs finished"),
                    PoolShutdown::Forced => warn!("File jobs aborted after shutdown timeout"),
                    PoolShutdown::Abandoned => error!("File jobs did not stop after abort"),
                }

                if let Err(e) = self.shared.bus.flush(self.limits.flush_timeout()).await {
                    error!(error = %e, "Failed to flush message bus");
                }
                if let Err(e) = self.shared.bus.close().await {
                    error!(error = %e, "Failed to close message bus");
                }

                self.shared.lifecycle.mark_closed();
                info!("File publisher stopped");
            })
            .await;
    }
}

impl FileHandler for FilePublisher {
    fn file_created(&self, path: PathBuf) {
        self.submit(path);
    }
}

#[cfg(test)]
mod tests;
