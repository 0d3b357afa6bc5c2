//! Directory watcher.
//!
//! Observes one directory for new entries and hands each one to a
//! [`FileHandler`]. The wait for filesystem events is bounded by the poll
//! timeout so the loop re-checks its lifecycle even when nothing happens.
//!
//! notify delivers events from its own thread; they are forwarded with
//! `blocking_send` into a bounded channel consumed by [`DirectoryWatcher::run`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::{validate_watch_dir, ConfigError};
use crate::lifecycle::Lifecycle;

/// Capacity of the notify -> watch loop channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Receives entries created in the watched directory.
///
/// Called on the watch loop; implementations must hand work off rather than
/// process it inline.
pub trait FileHandler: Send + Sync {
    fn file_created(&self, path: PathBuf);
}

/// Errors that can occur in the watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to initialize watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("Failed to watch path: {0}")]
    Watch(#[source] notify::Error),

    #[error("Watched directory is no longer available: {}", .0.display())]
    Invalidated(PathBuf),
}

/// Watches a single directory (non-recursively) for created entries.
pub struct DirectoryWatcher {
    dir: PathBuf,
    handler: Arc<dyn FileHandler>,
    poll_timeout: Duration,
    lifecycle: Lifecycle,
}

impl DirectoryWatcher {
    /// Create a watcher for `dir`.
    ///
    /// Fails if `dir` does not exist or is not a directory. Watching starts
    /// in [`run`](Self::run).
    pub fn new(
        dir: impl AsRef<Path>,
        handler: Arc<dyn FileHandler>,
        poll_timeout: Duration,
    ) -> Result<Self, WatcherError> {
        let dir = validate_watch_dir(dir.as_ref())?;
        Ok(Self {
            dir,
            handler,
            poll_timeout,
            lifecycle: Lifecycle::new(),
        })
    }

    /// Absolute path of the watched directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Stop watching. Idempotent; `run` returns within one poll interval.
    pub fn shutdown(&self) {
        if self.lifecycle.begin_shutdown() {
            info!(dir = %self.dir.display(), "Stopping directory watcher");
        } else {
            debug!(dir = %self.dir.display(), "Directory watcher already stopping");
        }
    }

    /// Watch until shutdown or until the directory becomes unavailable.
    ///
    /// The watch is always released before returning.
    pub async fn run(&self) -> Result<(), WatcherError> {
        if !self.lifecycle.is_running() {
            debug!(dir = %self.dir.display(), "Watcher shut down before start");
            self.lifecycle.mark_closed();
            return Ok(());
        }

        let (event_tx, mut event_rx) =
            mpsc::channel::<notify::Result<Event>>(EVENT_CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                // Runs on notify's thread. Fails only once the loop is gone.
                let _ = event_tx.blocking_send(res);
            },
            notify::Config::default(),
        )
        .map_err(WatcherError::Init)?;

        if let Err(e) = watcher.watch(&self.dir, RecursiveMode::NonRecursive) {
            self.lifecycle.mark_closed();
            return Err(WatcherError::Watch(e));
        }

        info!(dir = %self.dir.display(), "Watching directory");

        let result = self.watch_loop(&mut event_rx).await;

        if let Err(e) = watcher.unwatch(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "Failed to release directory watch");
        }
        drop(watcher);
        self.lifecycle.mark_closed();

        match &result {
            Ok(()) => info!(dir = %self.dir.display(), "Directory watcher stopped"),
            Err(e) => error!(dir = %self.dir.display(), error = %e, "Directory watcher failed"),
        }
        result
    }

    async fn watch_loop(
        &self,
        events: &mut mpsc::Receiver<notify::Result<Event>>,
    ) -> Result<(), WatcherError> {
        while self.lifecycle.is_running() {
            match tokio::time::timeout(self.poll_timeout, events.recv()).await {
                Err(_elapsed) => self.ensure_available()?,
                Ok(Some(Ok(event))) => self.dispatch(event)?,
                Ok(Some(Err(e))) => {
                    warn!(dir = %self.dir.display(), error = %e, "Watcher error");
                    self.ensure_available()?;
                }
                Ok(None) => {
                    return Err(WatcherError::Invalidated(self.dir.clone()));
                }
            }
        }
        Ok(())
    }

    fn ensure_available(&self) -> Result<(), WatcherError> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(WatcherError::Invalidated(self.dir.clone()))
        }
    }

    fn dispatch(&self, event: Event) -> Result<(), WatcherError> {
        if event.need_rescan() {
            warn!(
                dir = %self.dir.display(),
                "Event overflow, some created entries may not be reported"
            );
            return Ok(());
        }

        match event.kind {
            EventKind::Create(_) => {
                for path in &event.paths {
                    self.created(path);
                }
            }
            // Entries moved in from elsewhere count as created.
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    self.created(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let Some(to) = event.paths.get(1) {
                    if to.parent() == Some(self.dir.as_path()) {
                        self.created(to);
                    }
                }
            }
            EventKind::Remove(_) if event.paths.iter().any(|p| p == &self.dir) => {
                return Err(WatcherError::Invalidated(self.dir.clone()));
            }
            _ => trace!(kind = ?event.kind, "Ignoring event"),
        }
        Ok(())
    }

    fn created(&self, path: &Path) {
        let path = match path.file_name() {
            Some(name) => self.dir.join(name),
            None => path.to_path_buf(),
        };
        debug!(path = %path.display(), "Entry created");
        self.handler.file_created(path);
    }
}
