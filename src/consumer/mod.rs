//! Topic consumer.
//!
//! Appends every message of one topic to an output file, one per line, and
//! commits each message after it was written. Anything written but not yet
//! committed when the process dies is delivered again on the next run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::bus::{connect_subscription, BusError, Delivery, Subscription};
use crate::config::{validate_consumer_target, Config, ConfigError};
use crate::lifecycle::Lifecycle;

/// Errors that end a consumer run.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to write to {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Consumes one topic into an append-only output file.
pub struct MessageConsumer {
    topic: String,
    output: PathBuf,
    poll_timeout: Duration,
    subscription: Mutex<Option<Box<dyn Subscription>>>,
    lifecycle: Lifecycle,
}

impl MessageConsumer {
    /// Create a consumer over an existing subscription.
    ///
    /// Fails if `topic` or `output` is empty or the output's parent
    /// directory does not exist.
    pub fn new(
        topic: impl Into<String>,
        output: impl Into<PathBuf>,
        subscription: Box<dyn Subscription>,
        poll_timeout: Duration,
    ) -> Result<Self, ConsumerError> {
        let topic = topic.into();
        let output = output.into();
        validate_consumer_target(&topic, &output)?;

        Ok(Self {
            topic,
            output,
            poll_timeout,
            subscription: Mutex::new(Some(subscription)),
            lifecycle: Lifecycle::new(),
        })
    }

    /// Subscribe to `topic` on the configured broker.
    pub async fn connect(
        config: &Config,
        topic: &str,
        output: impl AsRef<Path>,
    ) -> Result<Self, ConsumerError> {
        validate_consumer_target(topic, output.as_ref())?;
        let subscription = connect_subscription(&config.messaging, topic).await?;
        Self::new(
            topic,
            output.as_ref(),
            subscription,
            config.limits.poll_timeout(),
        )
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Stop consuming. Idempotent; `run` returns within one poll interval.
    pub fn shutdown(&self) {
        if self.lifecycle.begin_shutdown() {
            info!(topic = %self.topic, "Stopping consumer");
        } else {
            debug!(topic = %self.topic, "Consumer already stopping");
        }
    }

    /// Consume until shutdown or a fatal error.
    ///
    /// The subscription is closed exactly once, whatever the outcome. Later
    /// calls return immediately.
    pub async fn run(&self) -> Result<(), ConsumerError> {
        let Some(mut subscription) = self.subscription.lock().await.take() else {
            debug!(topic = %self.topic, "Consumer already ran");
            return Ok(());
        };

        info!(
            topic = %self.topic,
            output = %self.output.display(),
            "Consuming topic"
        );

        let result = self.consume(subscription.as_mut()).await;

        if let Err(e) = subscription.close().await {
            warn!(topic = %self.topic, error = %e, "Failed to close subscription");
        }
        self.lifecycle.mark_closed();

        match &result {
            Ok(()) => info!(topic = %self.topic, "Consumer stopped"),
            Err(e) => error!(topic = %self.topic, error = %e, "Consumer failed"),
        }
        result
    }

    async fn consume(&self, subscription: &mut dyn Subscription) -> Result<(), ConsumerError> {
        while self.lifecycle.is_running() {
            let batch = subscription.poll(self.poll_timeout).await?;

            for delivery in &batch {
                // Left uncommitted; delivered again on the next run.
                if !self.lifecycle.is_running() {
                    debug!(topic = %self.topic, offset = delivery.offset, "Shutdown mid-batch");
                    break;
                }

                self.append(delivery).await?;

                if let Err(e) = subscription.commit(delivery).await {
                    warn!(
                        topic = %self.topic,
                        offset = delivery.offset,
                        error = %e,
                        "Failed to commit offset"
                    );
                }
            }
        }
        Ok(())
    }

    async fn append(&self, delivery: &Delivery) -> Result<(), ConsumerError> {
        let output_error = |source| ConsumerError::Output {
            path: self.output.clone(),
            source,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output)
            .await
            .map_err(output_error)?;

        let mut line = String::with_capacity(delivery.value.len() + 1);
        line.push_str(&delivery.value);
        line.push('\n');
        file.write_all(line.as_bytes()).await.map_err(output_error)?;
        file.flush().await.map_err(output_error)?;

        debug!(
            topic = %self.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "Wrote message"
        );
        Ok(())
    }
}
