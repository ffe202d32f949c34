//! Topic naming and creation.

use crate::error::{Error, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::ClientConfig;
use std::time::Duration;

/// Maps a (database, table) pair to the topic carrying its mutations.
///
/// Every operation kind of a table shares one topic, so consumers see a row's
/// insert, updates and delete in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNaming {
    template: String,
}

impl TopicNaming {
    pub const DEFAULT_TEMPLATE: &'static str = "{database}_{table}";

    /// Build a naming from a template with `{database}` and `{table}`
    /// placeholders. The template must contain `{table}`.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains("{table}") {
            return Err(Error::InvalidConfig(format!(
                "Topic template '{template}' must contain {{table}}"
            )));
        }
        Ok(Self { template })
    }

    pub fn topic(&self, database: &str, table: &str) -> String {
        self.template
            .replace("{database}", database)
            .replace("{table}", table)
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

impl Default for TopicNaming {
    fn default() -> Self {
        Self {
            template: Self::DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Create Kafka topic if it doesn't exist
pub async fn create_topic_if_not_exists(brokers: &str, topic: &str, partitions: i32) -> Result<()> {
    let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()
        .map_err(|e| Error::TopicCreation(format!("Failed to create admin client: {e}")))?;

    let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(1));
    let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));

    let results = admin_client
        .create_topics(&[new_topic], &opts)
        .await
        .map_err(|e| Error::TopicCreation(format!("Failed to create topics: {e}")))?;

    for result in results {
        match result {
            Ok(topic_name) => {
                tracing::info!("Topic '{topic_name}' created successfully");
            }
            Err((topic_name, err)) => {
                if err.to_string().contains("already exists") {
                    tracing::info!("Topic '{topic_name}' already exists");
                } else {
                    return Err(Error::TopicCreation(format!(
                        "Failed to create topic '{topic_name}': {err}"
                    )));
                }
            }
        }
    }

    Ok(())
}
