//! In-process channel broker for standalone mode and tests.
//!
//! Keeps one append-only log per topic and one committed offset per
//! (consumer group, topic), mirroring the broker semantics the pipeline
//! relies on: fire-and-forget publish, consumer-group resume, at-least-once
//! redelivery of anything not committed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use super::{BusError, Delivery, MessageBus, Result, Subscription};

/// Maximum deliveries returned by one poll.
const MAX_POLL_RECORDS: usize = 500;

#[derive(Default)]
struct BrokerState {
    /// topic -> message values, index = offset
    logs: HashMap<String, Vec<String>>,
    /// (group, topic) -> next offset to deliver
    committed: HashMap<(String, String), i64>,
}

/// Shared in-memory broker.
///
/// Create publishers with [`ChannelBroker::bus`] and consumers with
/// [`ChannelBroker::subscribe`].
#[derive(Default)]
pub struct ChannelBroker {
    state: Mutex<BrokerState>,
    appended: Notify,
}

impl ChannelBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a publish handle.
    pub fn bus(self: &Arc<Self>) -> ChannelBus {
        ChannelBus {
            broker: Arc::clone(self),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Subscribe `group_id` to `topic`, resuming at the group's committed offset.
    pub fn subscribe(
        self: &Arc<Self>,
        group_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> ChannelSubscription {
        let group_id = group_id.into();
        let topic = topic.into();
        info!(topic = %topic, group_id = %group_id, "Channel subscription created");
        ChannelSubscription {
            broker: Arc::clone(self),
            group_id,
            topic,
            position: None,
            closed: false,
        }
    }

    /// All values ever published to `topic`.
    pub async fn messages(&self, topic: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state.logs.get(topic).cloned().unwrap_or_default()
    }

    /// Committed offset of `group_id` on `topic`.
    pub async fn committed(&self, group_id: &str, topic: &str) -> Option<i64> {
        let state = self.state.lock().await;
        state
            .committed
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
    }

    async fn append(&self, topic: &str, value: &str) -> i64 {
        let offset = {
            let mut state = self.state.lock().await;
            let log = state.logs.entry(topic.to_string()).or_default();
            log.push(value.to_string());
            (log.len() - 1) as i64
        };
        self.appended.notify_waiters();
        offset
    }
}

/// Publish handle on a [`ChannelBroker`].
pub struct ChannelBus {
    broker: Arc<ChannelBroker>,
    closed: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl MessageBus for ChannelBus {
    async fn publish(&self, topic: &str, value: &str) -> Result<()> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let offset = self.broker.append(topic, value).await;
        debug!(topic = %topic, offset, "Published to channel");
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<()> {
        // Appends are synchronous; nothing is ever outstanding.
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        Ok(())
    }
}

/// Consumer-group subscription on a [`ChannelBroker`].
pub struct ChannelSubscription {
    broker: Arc<ChannelBroker>,
    group_id: String,
    topic: String,
    /// Next offset to hand out; loaded from the committed offset on first poll.
    position: Option<i64>,
    closed: bool,
}

impl ChannelSubscription {
    async fn take_batch(&mut self) -> Vec<Delivery> {
        let state = self.broker.state.lock().await;
        let start = *self.position.get_or_insert_with(|| {
            state
                .committed
                .get(&(self.group_id.clone(), self.topic.clone()))
                .copied()
                .unwrap_or(0)
        });

        let batch: Vec<Delivery> = state
            .logs
            .get(&self.topic)
            .map(|log| {
                log.iter()
                    .enumerate()
                    .skip(start as usize)
                    .take(MAX_POLL_RECORDS)
                    .map(|(offset, value)| Delivery {
                        topic: self.topic.clone(),
                        partition: 0,
                        offset: offset as i64,
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(last) = batch.last() {
            self.position = Some(last.offset + 1);
        }
        batch
    }
}

#[async_trait]
impl Subscription for ChannelSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Vec<Delivery>> {
        if self.closed {
            return Err(BusError::Closed);
        }

        // Register for wakeups before looking, so an append in between is not missed.
        let broker = Arc::clone(&self.broker);
        let appended = broker.appended.notified();

        let batch = self.take_batch().await;
        if !batch.is_empty() {
            return Ok(batch);
        }

        if tokio::time::timeout(timeout, appended).await.is_err() {
            return Ok(Vec::new());
        }
        Ok(self.take_batch().await)
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<()> {
        if self.closed {
            return Err(BusError::Closed);
        }
        let mut state = self.broker.state.lock().await;
        let next = delivery.offset + 1;
        let entry = state
            .committed
            .entry((self.group_id.clone(), self.topic.clone()))
            .or_insert(0);
        if next > *entry {
            *entry = next;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        info!(topic = %self.topic, group_id = %self.group_id, "Channel subscription closed");
        Ok(())
    }
}
