//! Typed producer: mutation → framed record on the table's topic.

use crate::error::{Error, Result};
use crate::topic::TopicNaming;
use crate::transport::Publisher;
use async_trait::async_trait;
use mutation_types::{
    encode_mutation, frame, message_key, Mutation, SchemaCatalog, SchemaId, SchemaRepository,
};
use std::sync::Arc;
use tracing::debug;

/// Broker acknowledgment for one sent mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub schema_id: SchemaId,
}

/// Receives mutations from an upstream change log reader.
#[async_trait]
pub trait MutationSink: Send + Sync {
    async fn on_mutation(&self, mutation: Mutation) -> Result<()>;
}

/// Publishes mutations as schema-tagged frames.
///
/// Every table of the catalog has its insert, update and delete subjects
/// registered when the producer is created, so a consumer sharing the
/// repository can resolve any frame this producer sends.
pub struct TypedProducer<P> {
    publisher: P,
    repository: Arc<SchemaRepository>,
    catalog: SchemaCatalog,
    naming: TopicNaming,
}

impl<P: Publisher> TypedProducer<P> {
    pub fn new(
        publisher: P,
        repository: Arc<SchemaRepository>,
        catalog: &SchemaCatalog,
    ) -> Result<Self> {
        for table in &catalog.tables {
            repository.register_table(table)?;
        }

        Ok(Self {
            publisher,
            repository,
            catalog: catalog.clone(),
            naming: TopicNaming::default(),
        })
    }

    pub fn with_topic_naming(mut self, naming: TopicNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn topic_naming(&self) -> &TopicNaming {
        &self.naming
    }

    pub fn repository(&self) -> &Arc<SchemaRepository> {
        &self.repository
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Encode, frame and publish one mutation.
    ///
    /// Resolves once the transport acknowledged the message. Rows that do not
    /// match their table schema are rejected before anything is published.
    /// Transport failures surface as [`Error::PublishFailed`]; there is no
    /// retry here.
    pub async fn send(&self, mutation: &Mutation) -> Result<DeliveryReport> {
        let schema = self
            .catalog
            .get_table(mutation.database(), mutation.table())
            .ok_or_else(|| Error::UnknownTable {
                database: mutation.database().to_string(),
                table: mutation.table().to_string(),
            })?;

        let subject = mutation.subject();
        let schema_id = match self.repository.id_for(&subject) {
            Ok(id) => id,
            Err(_) => self.repository.register(subject, schema.clone())?,
        };

        let body = encode_mutation(mutation, schema)?;
        let payload = frame::encode(schema_id, &body);
        let key = message_key(mutation, schema);
        let topic = self.naming.topic(mutation.database(), mutation.table());

        let delivery = self
            .publisher
            .publish(&topic, &key, &payload)
            .await
            .map_err(|e| Error::PublishFailed {
                topic: topic.clone(),
                source: Box::new(e),
            })?;

        debug!(
            topic = %topic,
            partition = delivery.partition,
            offset = delivery.offset,
            schema_id,
            "Sent {} mutation",
            mutation.kind()
        );

        Ok(DeliveryReport {
            topic,
            partition: delivery.partition,
            offset: delivery.offset,
            schema_id,
        })
    }
}

#[async_trait]
impl<P: Publisher> MutationSink for TypedProducer<P> {
    async fn on_mutation(&self, mutation: Mutation) -> Result<()> {
        self.send(&mutation).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use mutation_types::{
        ColumnDefinition, ColumnType, InsertMutation, OperationKind, Row, TableSchema,
        UpdateMutation,
    };

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(vec![TableSchema::new(
            "mypipe",
            "user",
            vec!["id".to_string()],
            vec![
                ColumnDefinition::new("id", ColumnType::Int32),
                ColumnDefinition::new("username", ColumnType::Text),
            ],
        )])
        .unwrap()
    }

    fn producer(broker: &MemoryBroker) -> TypedProducer<MemoryBroker> {
        TypedProducer::new(
            broker.clone(),
            Arc::new(SchemaRepository::new()),
            &catalog(),
        )
        .unwrap()
    }

    fn insert(id: i32, username: &str) -> Mutation {
        InsertMutation::new(
            "mypipe",
            "user",
            Row::new().with("id", id).with("username", username),
        )
        .into()
    }

    #[test]
    fn test_new_registers_every_subject() {
        let producer = producer(&MemoryBroker::new());
        assert_eq!(producer.repository().len(), 3);
    }

    #[tokio::test]
    async fn test_send_frames_with_subject_schema_id() {
        let broker = MemoryBroker::new();
        let producer = producer(&broker);

        let report = producer.send(&insert(1, "bob")).await.unwrap();
        assert_eq!(report.topic, "mypipe_user");

        let expected = producer
            .repository()
            .id_for(&mutation_types::Subject::new(
                "mypipe",
                "user",
                OperationKind::Insert,
            ))
            .unwrap();
        assert_eq!(report.schema_id, expected);

        let messages = broker.messages("mypipe_user");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key.as_deref(), Some(&b"1"[..]));
        let decoded = frame::decode(&messages[0].payload).unwrap();
        assert_eq!(decoded.schema_id, expected);
    }

    #[tokio::test]
    async fn test_row_mutations_share_a_partition() {
        let broker = MemoryBroker::new();
        let producer = producer(&broker);

        let first = producer.send(&insert(7, "bob")).await.unwrap();
        let update = UpdateMutation::new(
            "mypipe",
            "user",
            Row::new().with("id", 7).with("username", "bob"),
            Row::new().with("id", 7).with("username", "bob2"),
        );
        let second = producer.send(&update.into()).await.unwrap();

        assert_eq!(first.partition, second.partition);
        assert!(second.offset > first.offset);
        assert_ne!(first.schema_id, second.schema_id);
    }

    #[tokio::test]
    async fn test_invalid_row_is_not_published() {
        let broker = MemoryBroker::new();
        let producer = producer(&broker);

        let bad = InsertMutation::new("mypipe", "user", Row::new().with("id", "one"));
        let err = producer.send(&bad.into()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Types(mutation_types::Error::SchemaViolation { .. })
        ));
        assert!(broker.messages("mypipe_user").is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let producer = producer(&MemoryBroker::new());
        let other = InsertMutation::new("mypipe", "post", Row::new().with("id", 1));
        assert!(matches!(
            producer.send(&other.into()).await,
            Err(Error::UnknownTable { .. })
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_is_publish_failed() {
        let broker = MemoryBroker::new();
        let producer = producer(&broker);
        broker.disconnect();

        let err = producer.send(&insert(1, "bob")).await.unwrap_err();
        match err {
            Error::PublishFailed { topic, source } => {
                assert_eq!(topic, "mypipe_user");
                assert!(matches!(*source, Error::TransportDisconnected(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_mutation_sink() {
        let broker = MemoryBroker::new();
        let producer = producer(&broker).with_topic_naming(TopicNaming::new("{table}").unwrap());
        let sink: &dyn MutationSink = &producer;

        sink.on_mutation(insert(1, "bob")).await.unwrap();
        assert_eq!(broker.messages("user").len(), 1);
    }
}
