//! mypipe library
//!
//! Glue between mutation event files, the schema catalog and the typed Kafka
//! runtime, used by the `mypipe` binary.
//!
//! # CLI Usage
//!
//! ```bash
//! # Create one topic per catalog table
//! mypipe create-topics --catalog catalog.yaml --partitions 3
//!
//! # Publish mutation events from a JSON-lines file
//! mypipe produce --catalog catalog.yaml --events events.jsonl
//!
//! # Print the mutations of one table as JSON lines
//! mypipe consume --catalog catalog.yaml --database mypipe --table user
//! ```

use anyhow::Context;
use clap::Args;
use mutation_types::SchemaCatalog;
use mypipe_kafka::{ProducerConfig, TopicNaming};
use std::path::PathBuf;

pub mod consume;
pub mod events;
pub mod json;
pub mod produce;
pub mod topics;

/// Kafka connection options shared by every command
#[derive(Args, Clone, Debug)]
pub struct KafkaOpts {
    /// Kafka brokers (comma-separated, e.g., "localhost:9092")
    #[arg(long, env = "KAFKA_BROKERS", default_value = "localhost:9092")]
    pub kafka_brokers: String,

    /// Producer delivery timeout in milliseconds
    #[arg(long, default_value = "5000")]
    pub message_timeout_ms: u64,
}

impl KafkaOpts {
    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            brokers: self.kafka_brokers.clone(),
            message_timeout_ms: self.message_timeout_ms.to_string(),
        }
    }
}

/// Schema catalog and topic layout options
#[derive(Args, Clone, Debug)]
pub struct CatalogOpts {
    /// Path to the schema catalog YAML file
    #[arg(long, short = 'c', env = "MYPIPE_CATALOG")]
    pub catalog: PathBuf,

    /// Topic name template ({database} and {table} are substituted)
    #[arg(long, default_value = TopicNaming::DEFAULT_TEMPLATE)]
    pub topic_template: String,
}

impl CatalogOpts {
    pub fn load(&self) -> anyhow::Result<(SchemaCatalog, TopicNaming)> {
        let catalog = SchemaCatalog::from_file(&self.catalog).with_context(|| {
            format!("Failed to load schema catalog {}", self.catalog.display())
        })?;
        let naming = TopicNaming::new(self.topic_template.as_str())?;
        Ok((catalog, naming))
    }
}
