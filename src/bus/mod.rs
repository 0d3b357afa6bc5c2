//! Message channel between producer and consumers.
//!
//! This module contains:
//! - `MessageBus` trait: fire-and-forget publishing of words to topics
//! - `Subscription` trait: bounded-timeout polling of one topic
//! - Implementations: Kafka, in-process channel, Mock

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::MessagingConfig;

// Implementation modules
pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod mock;

// Re-exports
pub use channel::{ChannelBroker, ChannelBus, ChannelSubscription};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaBus, KafkaSubscription};
pub use mock::MockBus;

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish to topic '{topic}' failed: {message}")]
    Publish { topic: String, message: String },

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Poll failed: {0}")]
    Poll(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Flush failed: {0}")]
    Flush(String),

    #[error("Bus is closed")]
    Closed,
}

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub value: String,
}

/// Publishing side of the message channel.
///
/// `publish` hands the message over and returns without waiting for the
/// broker's acknowledgment. `flush` waits for everything handed over so far.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `value` to `topic` with no key.
    async fn publish(&self, topic: &str, value: &str) -> Result<()>;

    /// Wait until all accepted messages have been transmitted.
    async fn flush(&self, timeout: Duration) -> Result<()>;

    /// Release the publish handle. Later publishes fail with `BusError::Closed`.
    async fn close(&self) -> Result<()>;
}

/// Consuming side of the message channel: one topic, one consumer group.
///
/// Progress is tracked by the channel's consumer-group offsets. A delivery
/// that was not committed is delivered again to the next subscription of
/// the same group.
#[async_trait]
pub trait Subscription: Send {
    /// Subscribed topic.
    fn topic(&self) -> &str;

    /// Wait up to `timeout` for the next batch. An empty batch is not an error.
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<Delivery>>;

    /// Mark a delivery as processed.
    async fn commit(&mut self, delivery: &Delivery) -> Result<()>;

    /// Commit outstanding progress and leave the group.
    async fn close(&mut self) -> Result<()>;
}

// ============================================================================
// Factory
// ============================================================================

/// Connect a publisher to the configured broker.
///
/// Requires the `kafka` feature.
pub async fn connect_publisher(
    config: &MessagingConfig,
) -> std::result::Result<std::sync::Arc<dyn MessageBus>, BusError> {
    #[cfg(feature = "kafka")]
    {
        let bus = KafkaBus::new(config)?;
        info!(bootstrap_servers = %config.bootstrap_servers, "Message bus initialized");
        Ok(std::sync::Arc::new(bus))
    }

    #[cfg(not(feature = "kafka"))]
    {
        let _ = config;
        info!("Kafka publisher requested without kafka support");
        Err(BusError::Connection(
            "Kafka support requires the 'kafka' feature. Rebuild with --features kafka".to_string(),
        ))
    }
}

/// Subscribe to `topic` under the topic's consumer group.
///
/// Requires the `kafka` feature.
pub async fn connect_subscription(
    config: &MessagingConfig,
    topic: &str,
) -> std::result::Result<Box<dyn Subscription>, BusError> {
    #[cfg(feature = "kafka")]
    {
        let group_id = config.consumer_group_for(topic);
        let subscription = KafkaSubscription::new(config, &group_id, topic)?;
        info!(topic = %topic, group_id = %group_id, "Subscription initialized");
        Ok(Box::new(subscription))
    }

    #[cfg(not(feature = "kafka"))]
    {
        let _ = (config, topic);
        info!("Kafka subscription requested without kafka support");
        Err(BusError::Connection(
            "Kafka support requires the 'kafka' feature. Rebuild with --features kafka".to_string(),
        ))
    }
}
