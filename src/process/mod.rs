//! Producer and consumer process runners.
//!
//! Each runner wires the services together, starts a task that waits for
//! the termination future and shuts the services down in order, and runs
//! the main loop on the calling task:
//!
//! ```text
//! starting -> running -> shutting-down -> terminated
//! ```
//!
//! The binaries pass [`shutdown_signal`](crate::utils::signal::shutdown_signal)
//! as the termination future; tests pass a channel.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};

use crate::bus::{BusError, MessageBus};
use crate::config::{validate_watch_dir, Config, ConfigError};
use crate::consumer::{ConsumerError, MessageConsumer};
use crate::publisher::FilePublisher;
use crate::watcher::{DirectoryWatcher, WatcherError};

pub const PRODUCER_USAGE: &str = "Usage: word-splitter-producer <watch-directory>";
pub const CONSUMER_USAGE: &str = "Usage: word-splitter-consumer <topic> <output-file>";

/// Errors that end a process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Watch a directory and publish the words of every new file.
#[derive(Debug, Parser)]
#[command(name = "word-splitter-producer", version)]
pub struct ProducerArgs {
    /// Directory to watch for new files
    #[arg(value_name = "watch-directory")]
    pub watch_dir: PathBuf,

    /// Configuration file (YAML)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Append every message of one topic to a file.
#[derive(Debug, Parser)]
#[command(name = "word-splitter-consumer", version)]
pub struct ConsumerArgs {
    /// Topic to consume (a word length, e.g. "5")
    pub topic: String,

    /// File the messages are appended to
    #[arg(value_name = "output-file")]
    pub output: PathBuf,

    /// Configuration file (YAML)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Exit code for a failed argument parse.
///
/// `--help` and `--version` print and succeed; anything else prints `usage`
/// to stderr and fails.
pub fn exit_for_parse_error(err: clap::Error, usage: &str) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = err.print();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("{usage}");
            ExitCode::FAILURE
        }
    }
}

/// Print an argument error and the usage line to stderr.
pub fn exit_for_invalid_argument(err: &ConfigError, usage: &str) -> ExitCode {
    eprintln!("Error: {err}");
    eprintln!("{usage}");
    ExitCode::FAILURE
}

/// Run the producer until `shutdown` resolves or the watch loop fails.
///
/// On either path the watcher stops first, then the publisher drains its
/// pool and flushes and closes `bus`.
pub async fn run_producer<F>(
    watch_dir: &Path,
    config: &Config,
    bus: Arc<dyn MessageBus>,
    shutdown: F,
) -> Result<(), ProcessError>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(watch_dir = %watch_dir.display(), "Producer starting");
    let watch_dir = validate_watch_dir(watch_dir)?;

    let publisher = Arc::new(FilePublisher::new(bus, &config.limits));
    let watcher = match DirectoryWatcher::new(
        &watch_dir,
        publisher.clone(),
        config.limits.poll_timeout(),
    ) {
        Ok(watcher) => Arc::new(watcher),
        Err(e) => {
            publisher.shutdown().await;
            return Err(e.into());
        }
    };

    info!(watch_dir = %watch_dir.display(), "Producer running");
    drive_producer(watcher, publisher, shutdown).await
}

/// Run `watcher` until `shutdown` resolves or it fails, then stop it before
/// shutting `publisher` down.
pub async fn drive_producer<F>(
    watcher: Arc<DirectoryWatcher>,
    publisher: Arc<FilePublisher>,
    shutdown: F,
) -> Result<(), ProcessError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hook = {
        let watcher = Arc::clone(&watcher);
        let publisher = Arc::clone(&publisher);
        tokio::spawn(async move {
            shutdown.await;
            info!("Producer shutting down");
            watcher.shutdown();
            publisher.shutdown().await;
        })
    };

    let result = watcher.run().await;

    watcher.shutdown();
    publisher.shutdown().await;
    hook.abort();

    info!("Producer terminated");
    result.map_err(Into::into)
}

/// Run `consumer` until `shutdown` resolves or consuming fails.
pub async fn run_consumer<F>(consumer: MessageConsumer, shutdown: F) -> Result<(), ProcessError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let consumer = Arc::new(consumer);
    info!(topic = %consumer.topic(), output = %consumer.output().display(), "Consumer starting");

    let hook = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move {
            shutdown.await;
            info!("Consumer shutting down");
            consumer.shutdown();
        })
    };

    let result = consumer.run().await;
    consumer.shutdown();
    hook.abort();

    info!(topic = %consumer.topic(), "Consumer terminated");
    result.map_err(Into::into)
}

/// Log a fatal error and map it to the failing exit code.
pub fn exit_for_error(err: &ProcessError) -> ExitCode {
    error!(error = %err, details = ?err, "Process failed");
    ExitCode::FAILURE
}
