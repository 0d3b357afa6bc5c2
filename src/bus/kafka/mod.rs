//! Kafka message bus implementation.
//!
//! Topic naming: the topic string is used as-is (words go to `"3"`..`"10"`).
//! Messages carry no key; the value is the UTF-8 word.
//!
//! Publishing uses a `ThreadedProducer`: `publish` only enqueues into
//! librdkafka's buffer and delivery failures are reported through the
//! producer context, which logs them. Subscriptions use a `StreamConsumer`
//! with manual offset storage and periodic auto-commit, so an append that
//! was not followed by a stored offset is redelivered (at-least-once).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::{ClientConfig, ClientContext};
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

use super::{BusError, Delivery, MessageBus, Result, Subscription};
use crate::config::{MessagingConfig, PayloadEncoding};

/// Maximum deliveries returned by one poll.
const MAX_POLL_RECORDS: usize = 500;

/// Build a ClientConfig for producers.
fn producer_config(config: &MessagingConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.bootstrap_servers);
    client.set("message.timeout.ms", config.message_timeout_ms.to_string());
    client.set("acks", "all");
    client
}

/// Build a ClientConfig for consumers.
fn consumer_config(config: &MessagingConfig, group_id: &str) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.bootstrap_servers);
    client.set("group.id", group_id);
    client.set("enable.auto.commit", "true");
    client.set("enable.auto.offset.store", "false");
    client.set("auto.offset.reset", "earliest");
    client
}

/// Producer context that logs delivery reports.
pub struct DeliveryLogger;

impl ClientContext for DeliveryLogger {}

impl ProducerContext for DeliveryLogger {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        match delivery_result {
            Ok(message) => trace!(
                topic = %message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "Message delivered"
            ),
            Err((e, message)) => error!(
                topic = %message.topic(),
                partition = message.partition(),
                error = %e,
                "Message delivery failed"
            ),
        }
    }
}

type WordProducer = ThreadedProducer<DeliveryLogger>;

/// Kafka publisher.
pub struct KafkaBus {
    producer: RwLock<Option<Arc<WordProducer>>>,
    encoding: PayloadEncoding,
}

impl KafkaBus {
    /// Create a producer for the configured brokers.
    pub fn new(config: &MessagingConfig) -> Result<Self> {
        let producer: WordProducer = producer_config(config)
            .create_with_context(DeliveryLogger)
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            value_serializer = config.value_encoding.as_str(),
            "Connected to Kafka"
        );

        Ok(Self {
            producer: RwLock::new(Some(Arc::new(producer))),
            encoding: config.value_encoding,
        })
    }

    async fn handle(&self) -> Result<Arc<WordProducer>> {
        self.producer.read().await.clone().ok_or(BusError::Closed)
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    async fn publish(&self, topic: &str, value: &str) -> Result<()> {
        let producer = self.handle().await?;
        let record = BaseRecord::<(), [u8]>::to(topic).payload(self.encoding.encode(value));

        producer
            .send(record)
            .map_err(|(e, _record)| BusError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        trace!(topic = %topic, "Enqueued message");
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> Result<()> {
        let producer = self.handle().await?;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| BusError::Flush(e.to_string()))?
            .map_err(|e| BusError::Flush(e.to_string()))?;

        debug!("Flushed Kafka producer");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Dropping the last handle stops the producer's polling thread.
        if self.producer.write().await.take().is_some() {
            info!("Kafka producer closed");
        }
        Ok(())
    }
}

/// Kafka consumer-group subscription to a single topic.
pub struct KafkaSubscription {
    consumer: StreamConsumer,
    topic: String,
    group_id: String,
    encoding: PayloadEncoding,
}

impl KafkaSubscription {
    /// Join `group_id` and subscribe to `topic`.
    pub fn new(config: &MessagingConfig, group_id: &str, topic: &str) -> Result<Self> {
        let consumer: StreamConsumer = consumer_config(config, group_id)
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to {}: {}", topic, e)))?;

        info!(topic = %topic, group_id = %group_id, "Subscribed to Kafka topic");

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            encoding: config.value_encoding,
        })
    }

    /// Convert a message, skipping (and storing the offset of) undecodable ones.
    fn decode(&self, message: &BorrowedMessage<'_>) -> Option<Delivery> {
        let value = match message.payload().map(|p| self.encoding.decode(p)) {
            Some(Ok(value)) => value.to_string(),
            Some(Err(e)) => {
                warn!(
                    topic = %message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    error = %e,
                    "Skipping message with undecodable payload"
                );
                self.skip(message.topic(), message.partition(), message.offset());
                return None;
            }
            None => {
                warn!(
                    topic = %message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    "Skipping message with no payload"
                );
                self.skip(message.topic(), message.partition(), message.offset());
                return None;
            }
        };

        Some(Delivery {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            value,
        })
    }

    /// Store `offset` as processed. The stored value is the next offset to read.
    fn store(&self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        self.consumer
            .store_offset(topic, partition, offset + 1)
            .map_err(|e| BusError::Commit(e.to_string()))
    }

    fn skip(&self, topic: &str, partition: i32, offset: i64) {
        if let Err(e) = self.store(topic, partition, offset) {
            warn!(topic = %topic, partition, offset, error = %e, "Failed to store offset");
        }
    }
}

#[async_trait]
impl Subscription for KafkaSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Vec<Delivery>> {
        let mut batch = Vec::new();

        let first = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => return Ok(batch),
            Ok(result) => result.map_err(|e| BusError::Poll(e.to_string()))?,
        };
        batch.extend(self.decode(&first));
        drop(first);

        // Drain whatever is already buffered without waiting again.
        while batch.len() < MAX_POLL_RECORDS {
            match self.consumer.recv().now_or_never() {
                Some(Ok(message)) => batch.extend(self.decode(&message)),
                Some(Err(e)) => {
                    warn!(topic = %self.topic, error = %e, "Kafka consumer error");
                    break;
                }
                None => break,
            }
        }

        Ok(batch)
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<()> {
        self.store(&delivery.topic, delivery.partition, delivery.offset)
    }

    async fn close(&mut self) -> Result<()> {
        let result = match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => Ok(()),
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                debug!(topic = %self.topic, "No offsets to commit on close");
                Ok(())
            }
            Err(e) => Err(BusError::Commit(e.to_string())),
        };

        self.consumer.unsubscribe();
        info!(topic = %self.topic, group_id = %self.group_id, "Kafka subscription closed");
        result
    }
}
