use mutation_types::{SchemaId, Subject};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error(transparent)]
    Types(#[from] mutation_types::Error),

    #[error("Failed to publish to topic '{topic}': {source}")]
    PublishFailed {
        topic: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to subscribe to topic '{topic}' as group '{group_id}': {source}")]
    SubscriptionFailed {
        topic: String,
        group_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Cannot resolve schema {schema_id}: {source}")]
    UnresolvedSchema {
        schema_id: SchemaId,
        #[source]
        source: mutation_types::Error,
    },

    #[error("Failed to deserialize message at {topic}/{partition}@{offset}: {source}")]
    DeserializationFailed {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: mutation_types::Error,
    },

    #[error("Callback for {subject} failed: {message}")]
    CallbackFailed { subject: Subject, message: String },

    #[error("Transport disconnected: {0}")]
    TransportDisconnected(String),

    #[error("Table {database}.{table} is not in the schema catalog")]
    UnknownTable { database: String, table: String },

    #[error("Topic creation error: {0}")]
    TopicCreation(String),

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
