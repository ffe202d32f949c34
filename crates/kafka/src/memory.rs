//! In-process broker implementing the transport traits.
//!
//! Topics are created on first use with a fixed number of partitions, and a
//! message's partition is a hash of its key, so per-key order is kept the same
//! way Kafka keeps it. Each group tracks committed offsets per partition; a
//! new subscription resumes from them. A group has at most one live member.

use crate::error::{Error, Result};
use crate::transport::{Delivery, FrameSource, Publisher, RawMessage, Subscriber};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, Vec<Vec<RawMessage>>>,
    /// (topic, group) -> partition -> next offset to read
    committed: HashMap<(String, String), HashMap<i32, i64>>,
    members: HashSet<(String, String)>,
    disconnected: bool,
}

#[derive(Debug)]
struct Shared {
    partitions: i32,
    state: Mutex<State>,
    appended: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to an in-memory broker.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub const DEFAULT_PARTITIONS: i32 = 3;

    pub fn new() -> Self {
        Self::with_partitions(Self::DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: i32) -> Self {
        Self {
            shared: Arc::new(Shared {
                partitions: partitions.max(1),
                state: Mutex::new(State::default()),
                appended: Notify::new(),
            }),
        }
    }

    pub fn partitions(&self) -> i32 {
        self.shared.partitions
    }

    /// Partition a key is stored in.
    pub fn partition_for(&self, key: &[u8]) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shared.partitions as u64) as i32
    }

    /// Append a payload without going through the typed producer.
    ///
    /// Keyless messages go to partition 0.
    pub fn publish_raw(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<Delivery> {
        let partition = key.map(|k| self.partition_for(k)).unwrap_or(0);

        let delivery = {
            let mut state = self.shared.lock();
            if state.disconnected {
                return Err(Error::TransportDisconnected(
                    "in-memory broker is disconnected".to_string(),
                ));
            }

            let partitions = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| vec![Vec::new(); self.shared.partitions as usize]);
            let log = &mut partitions[partition as usize];
            let offset = log.len() as i64;
            log.push(RawMessage {
                topic: topic.to_string(),
                partition,
                offset,
                key: key.map(|k| k.to_vec()),
                payload: payload.to_vec(),
                timestamp: Some(Utc::now().timestamp_millis()),
            });
            Delivery { partition, offset }
        };

        self.shared.appended.notify_waiters();
        Ok(delivery)
    }

    /// Every message of a topic, partition by partition.
    pub fn messages(&self, topic: &str) -> Vec<RawMessage> {
        self.shared
            .lock()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// The next offset `group_id` will read from `partition`, if it committed.
    pub fn committed_offset(&self, topic: &str, group_id: &str, partition: i32) -> Option<i64> {
        self.shared
            .lock()
            .committed
            .get(&(topic.to_string(), group_id.to_string()))
            .and_then(|offsets| offsets.get(&partition).copied())
    }

    /// Simulate losing the broker: every later call fails.
    pub fn disconnect(&self) {
        self.shared.lock().disconnected = true;
        self.shared.appended.notify_waiters();
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<Delivery> {
        self.publish_raw(topic, Some(key), payload)
    }
}

#[async_trait]
impl Subscriber for MemoryBroker {
    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<Box<dyn FrameSource>> {
        let member = (topic.to_string(), group_id.to_string());
        let positions = {
            let mut state = self.shared.lock();
            if state.disconnected {
                return Err(Error::TransportDisconnected(
                    "in-memory broker is disconnected".to_string(),
                ));
            }
            if !state.members.insert(member.clone()) {
                return Err(Error::Consumer(format!(
                    "Group '{group_id}' already has a member on topic '{topic}'"
                )));
            }
            state.committed.get(&member).cloned().unwrap_or_default()
        };

        debug!("Group '{}' subscribed to topic '{}'", group_id, topic);
        Ok(Box::new(MemoryFrameSource {
            shared: Arc::clone(&self.shared),
            member,
            positions,
            subscribed: true,
        }))
    }
}

struct MemoryFrameSource {
    shared: Arc<Shared>,
    member: (String, String),
    /// partition -> next offset to hand out
    positions: HashMap<i32, i64>,
    subscribed: bool,
}

impl MemoryFrameSource {
    fn take_available(&mut self, max: usize) -> Result<Vec<RawMessage>> {
        let state = self.shared.lock();
        if state.disconnected {
            return Err(Error::TransportDisconnected(
                "in-memory broker is disconnected".to_string(),
            ));
        }

        let mut batch = Vec::new();
        if let Some(partitions) = state.topics.get(&self.member.0) {
            for (partition, log) in partitions.iter().enumerate() {
                let position = self.positions.entry(partition as i32).or_insert(0);
                while batch.len() < max {
                    match log.get(*position as usize) {
                        Some(message) => {
                            batch.push(message.clone());
                            *position += 1;
                        }
                        None => break,
                    }
                }
            }
        }

        Ok(batch)
    }

    fn leave(&mut self) {
        if self.subscribed {
            self.subscribed = false;
            self.shared.lock().members.remove(&self.member);
        }
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    async fn poll_batch(&mut self, max: usize, timeout: Duration) -> Result<Vec<RawMessage>> {
        if !self.subscribed {
            return Err(Error::Consumer("Subscription is closed".to_string()));
        }

        let shared = Arc::clone(&self.shared);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before looking, so an append between the
            // check and the wait still wakes us.
            let appended = shared.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            let batch = self.take_available(max.max(1))?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn commit(&mut self, messages: &[RawMessage]) -> Result<()> {
        let mut state = self.shared.lock();
        if state.disconnected {
            return Err(Error::TransportDisconnected(
                "in-memory broker is disconnected".to_string(),
            ));
        }

        let offsets = state.committed.entry(self.member.clone()).or_default();
        for message in messages {
            let next = offsets.entry(message.partition).or_insert(0);
            *next = (*next).max(message.offset + 1);
        }
        Ok(())
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        self.leave();
        debug!(
            "Group '{}' unsubscribed from topic '{}'",
            self.member.1, self.member.0
        );
        Ok(())
    }
}

impl Drop for MemoryFrameSource {
    fn drop(&mut self) {
        self.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_keeps_publish_order() {
        let broker = MemoryBroker::new();
        for i in 0..5u8 {
            broker.publish("users", b"42", &[i]).await.unwrap();
        }
        broker.publish("users", b"7", b"other").await.unwrap();

        let mut source = broker.subscribe("users", "g").await.unwrap();
        let batch = source
            .poll_batch(100, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(batch.len(), 6);

        let partition = broker.partition_for(b"42");
        let payloads: Vec<u8> = batch
            .iter()
            .filter(|m| m.partition == partition && m.key.as_deref() == Some(&b"42"[..]))
            .map(|m| m.payload[0])
            .collect();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_messages_carry_publish_time() {
        let broker = MemoryBroker::new();
        let before = Utc::now().timestamp_millis();
        broker.publish("users", b"42", b"x").await.unwrap();
        let after = Utc::now().timestamp_millis();

        let messages = broker.messages("users");
        let timestamp = messages[0].timestamp.unwrap();
        assert!(before <= timestamp && timestamp <= after);
    }

    #[tokio::test]
    async fn test_poll_times_out_with_empty_batch() {
        let broker = MemoryBroker::new();
        let mut source = broker.subscribe("users", "g").await.unwrap();
        let batch = source
            .poll_batch(10, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_poll_wakes_on_publish() {
        let broker = MemoryBroker::new();
        let mut source = broker.subscribe("users", "g").await.unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("users", b"1", b"late").await.unwrap();
        });

        let batch = source.poll_batch(10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, b"late");
    }

    #[tokio::test]
    async fn test_resume_from_committed_offsets() {
        let broker = MemoryBroker::with_partitions(1);
        for i in 0..4u8 {
            broker.publish("users", b"k", &[i]).await.unwrap();
        }

        let mut source = broker.subscribe("users", "g").await.unwrap();
        let batch = source.poll_batch(2, Duration::from_millis(50)).await.unwrap();
        assert_eq!(batch.len(), 2);
        source.commit(&batch).await.unwrap();
        // Polled but never committed
        source.poll_batch(1, Duration::from_millis(50)).await.unwrap();
        source.unsubscribe().await.unwrap();
        assert_eq!(broker.committed_offset("users", "g", 0), Some(2));

        let mut source = broker.subscribe("users", "g").await.unwrap();
        let batch = source
            .poll_batch(10, Duration::from_millis(50))
            .await
            .unwrap();
        let payloads: Vec<u8> = batch.iter().map(|m| m.payload[0]).collect();
        assert_eq!(payloads, vec![2, 3]);

        // Another group starts from the beginning
        let mut other = broker.subscribe("users", "h").await.unwrap();
        let batch = other.poll_batch(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(batch.len(), 4);
    }

    #[tokio::test]
    async fn test_one_member_per_group() {
        let broker = MemoryBroker::new();
        let source = broker.subscribe("users", "g").await.unwrap();
        assert!(broker.subscribe("users", "g").await.is_err());

        drop(source);
        assert!(broker.subscribe("users", "g").await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect() {
        let broker = MemoryBroker::new();
        let mut source = broker.subscribe("users", "g").await.unwrap();

        let handle = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.disconnect();
        });

        let err = source
            .poll_batch(10, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransportDisconnected(_)));
        assert!(matches!(
            broker.publish("users", b"1", b"x").await,
            Err(Error::TransportDisconnected(_))
        ));
    }
}
