use std::time::Duration;

/// Configuration for the Kafka publisher
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// How long the client may spend delivering one message before
    /// `send` fails, in milliseconds
    pub message_timeout_ms: String,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            message_timeout_ms: "5000".to_string(),
        }
    }
}

/// Configuration for a typed consumer and the Kafka subscriber behind it
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Consumer group ID
    pub group_id: String,
    /// Topic to consume from
    ///
    /// One topic carries every operation kind of one table; the kind of each
    /// message is recovered from its schema id.
    pub topic: String,
    /// Maximum number of messages dispatched per batch
    ///
    /// Offsets are committed once per batch, so a larger batch means fewer
    /// commits but more redelivered messages after a crash.
    pub batch_size: usize,
    /// Upper bound on how long one poll waits for the first message
    ///
    /// Stop requests are observed between polls, so this also bounds how
    /// long `stop()` takes to be noticed on an idle topic.
    pub poll_timeout: Duration,
    /// Auto offset reset strategy ("earliest" or "latest")
    ///
    /// "earliest" is preferred for change streams to avoid missing mutations
    /// when the group has no committed offsets yet.
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
    /// Enable auto commit
    ///
    /// False by default: offsets are committed after each dispatched batch.
    pub enable_auto_commit: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "mypipe-consumer".to_string(),
            topic: "".to_string(),
            batch_size: 100,
            poll_timeout: Duration::from_millis(500),
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: "6000".to_string(),
            enable_auto_commit: false,
        }
    }
}
