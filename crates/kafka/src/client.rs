use crate::config::{ConsumerConfig, ProducerConfig};
use crate::error::{Error, Result};
use crate::transport::{Delivery, FrameSource, Publisher, RawMessage, Subscriber};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message as RdkafkaMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// How long `send` may wait for room in the client's local queue
const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages arriving this soon after the first one join its batch
const BATCH_FILL_TIMEOUT: Duration = Duration::from_millis(10);

/// [`Publisher`] backed by an rdkafka `FutureProducer`
pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl KafkaPublisher {
    pub fn new(config: &ProducerConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", &config.message_timeout_ms)
            .create()
            .map_err(|e| Error::InvalidConfig(format!("Failed to create producer: {e}")))?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<Delivery> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let (partition, offset) = self
            .producer
            .send(record, QUEUE_TIMEOUT)
            .await
            .map_err(|(err, _)| transport_error(err))?;

        Ok(Delivery { partition, offset })
    }
}

/// [`Subscriber`] creating one rdkafka `StreamConsumer` per subscription
#[derive(Debug, Clone)]
pub struct KafkaSubscriber {
    config: ConsumerConfig,
}

impl KafkaSubscriber {
    pub fn new(config: ConsumerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Subscriber for KafkaSubscriber {
    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<Box<dyn FrameSource>> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", group_id)
            .set(
                "enable.auto.commit",
                self.config.enable_auto_commit.to_string(),
            )
            .set("auto.offset.reset", &self.config.auto_offset_reset)
            .set("session.timeout.ms", &self.config.session_timeout_ms)
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| Error::Consumer(format!("Failed to create consumer: {e}")))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| Error::Consumer(format!("Failed to subscribe to topic: {e}")))?;

        debug!("Group '{}' subscribed to Kafka topic '{}'", group_id, topic);
        Ok(Box::new(KafkaFrameSource { consumer }))
    }
}

struct KafkaFrameSource {
    consumer: StreamConsumer,
}

#[async_trait]
impl FrameSource for KafkaFrameSource {
    async fn poll_batch(&mut self, max: usize, timeout: Duration) -> Result<Vec<RawMessage>> {
        let mut messages = Vec::new();

        // Wait for the first message up to the poll timeout
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(msg)) => messages.push(raw_message(&msg)),
            Ok(Err(e)) => return Err(transport_error(e)),
            Err(_) => return Ok(messages),
        }

        // Then take whatever else is already there
        while messages.len() < max {
            match tokio::time::timeout(BATCH_FILL_TIMEOUT, self.consumer.recv()).await {
                Ok(Ok(msg)) => messages.push(raw_message(&msg)),
                _ => break,
            }
        }

        Ok(messages)
    }

    async fn commit(&mut self, messages: &[RawMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut next_offsets: BTreeMap<(&str, i32), i64> = BTreeMap::new();
        for message in messages {
            let next = next_offsets
                .entry((message.topic.as_str(), message.partition))
                .or_insert(0);
            *next = (*next).max(message.offset + 1);
        }

        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in next_offsets {
            tpl.add_partition_offset(topic, partition, Offset::Offset(offset))
                .map_err(|e| Error::Consumer(format!("Failed to add partition offset: {e}")))?;
        }

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(transport_error)?;

        Ok(())
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

fn raw_message(msg: &BorrowedMessage) -> RawMessage {
    RawMessage {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(|k| k.to_vec()),
        // A missing payload becomes an empty frame and is skipped downstream
        payload: msg.payload().unwrap_or_default().to_vec(),
        timestamp: msg.timestamp().to_millis(),
    }
}

fn transport_error(err: KafkaError) -> Error {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::AllBrokersDown) | Some(RDKafkaErrorCode::BrokerTransportFailure) => {
            Error::TransportDisconnected(err.to_string())
        }
        _ => Error::Kafka(err),
    }
}
