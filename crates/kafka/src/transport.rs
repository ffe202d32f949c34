//! Transport seams between the typed runtime and a message broker.
//!
//! The typed producer and consumer only see these traits; [`crate::client`]
//! implements them on top of rdkafka and [`crate::memory`] in process.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Where the broker stored a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// A message as read from the broker, before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    /// Message timestamp (milliseconds since epoch)
    pub timestamp: Option<i64>,
}

/// Publishes opaque payloads.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message, resolving once the broker acknowledged it.
    ///
    /// Messages with the same key land on the same partition.
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<Delivery>;
}

/// Opens consumer-group subscriptions.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Join `group_id` on `topic`.
    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<Box<dyn FrameSource>>;
}

/// One live subscription.
#[async_trait]
pub trait FrameSource: Send {
    /// Receive up to `max` messages in partition order.
    ///
    /// Waits at most `timeout` for the first message and returns an empty
    /// batch if none arrived. Fails with
    /// [`crate::Error::TransportDisconnected`] once the broker is gone.
    async fn poll_batch(&mut self, max: usize, timeout: Duration) -> Result<Vec<RawMessage>>;

    /// Commit the offsets of every message in `messages` for the group.
    async fn commit(&mut self, messages: &[RawMessage]) -> Result<()>;

    /// Leave the group.
    async fn unsubscribe(&mut self) -> Result<()>;
}
