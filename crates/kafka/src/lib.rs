//! Typed producer/consumer runtime for schema-tagged row mutations.
//!
//! Producers turn [`mutation_types::Mutation`]s into frames (schema id header +
//! protobuf body) and publish them to one topic per table. Consumers read those
//! frames back, resolve the schema id through a shared
//! [`mutation_types::SchemaRepository`] and hand each mutation to a typed
//! callback.
//!
//! Features:
//!
//! - Transport seams: [`Publisher`], [`Subscriber`] and [`FrameSource`], with
//!   an rdkafka implementation and an in-memory broker
//! - Per-row ordering: messages are keyed by primary key
//! - Batch processing: offsets are committed after each dispatched batch
//! - Fault isolation: undecodable messages and failing callbacks are skipped
//!   and counted, not fatal

/// Kafka-backed transport
///
/// `FutureProducer` for publishing, one `StreamConsumer` per subscription.
pub mod client;
pub mod config;

/// Typed consumer state machine and its handle
pub mod consumer;
pub mod error;

/// In-process broker for tests and local runs
pub mod memory;
pub mod producer;
pub mod topic;
pub mod transport;

// Re-export main types for easy access
pub use client::{KafkaPublisher, KafkaSubscriber};
pub use config::{ConsumerConfig, ProducerConfig};
pub use consumer::{ConsumerHandle, ConsumerState, ConsumerStats, Flow, TypedConsumer};
pub use error::{Error, Result};
pub use memory::MemoryBroker;
pub use producer::{DeliveryReport, MutationSink, TypedProducer};
pub use topic::{create_topic_if_not_exists, TopicNaming};
pub use transport::{Delivery, FrameSource, Publisher, RawMessage, Subscriber};
