//! Mock message bus for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, MessageBus, Result};

/// Mock bus that records published messages.
#[derive(Default)]
pub struct MockBus {
    published: RwLock<Vec<(String, String)>>,
    fail_on_publish: RwLock<Option<String>>,
    fail_on_flush: RwLock<bool>,
    publish_delay: RwLock<Option<Duration>>,
    flush_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every publish to `topic`.
    pub async fn set_fail_on_publish(&self, topic: impl Into<String>) {
        *self.fail_on_publish.write().await = Some(topic.into());
    }

    pub async fn set_fail_on_flush(&self, fail: bool) {
        *self.fail_on_flush.write().await = fail;
    }

    /// Hold every publish for `delay` before recording it.
    pub async fn set_publish_delay(&self, delay: Duration) {
        *self.publish_delay.write().await = Some(delay);
    }

    /// Published `(topic, value)` pairs in publish order.
    pub async fn published(&self) -> Vec<(String, String)> {
        self.published.read().await.clone()
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBus for MockBus {
    async fn publish(&self, topic: &str, value: &str) -> Result<()> {
        let delay = *self.publish_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_publish.read().await.as_deref() == Some(topic) {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                message: "Mock publish failure".to_string(),
            });
        }
        self.published
            .write()
            .await
            .push((topic.to_string(), value.to_string()));
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_on_flush.read().await {
            return Err(BusError::Flush("Mock flush failure".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_bus_records_publish() {
        let bus = MockBus::new();
        bus.publish("5", "hello").await.unwrap();

        assert_eq!(bus.published_count().await, 1);
        assert_eq!(
            bus.published().await,
            vec![("5".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_mock_bus_fail_on_publish() {
        let bus = MockBus::new();
        bus.set_fail_on_publish("5").await;

        assert!(bus.publish("5", "hello").await.is_err());
        assert!(bus.publish("3", "cat").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_bus_counts_flush_and_close() {
        let bus = MockBus::new();
        bus.set_fail_on_flush(true).await;

        assert!(bus.flush(Duration::from_millis(1)).await.is_err());
        bus.close().await.unwrap();

        assert_eq!(bus.flush_calls(), 1);
        assert_eq!(bus.close_calls(), 1);
    }
}
