//! Typed round trip through a real Kafka broker
//!
//! Test flow:
//! 1. Create a per-run topic for `mypipe.user`
//! 2. Publish insert, update and delete through the typed producer
//! 3. Consume with a fresh group from a repository built from the same catalog
//! 4. Verify the mutations arrive in order with their row images intact

use chrono::Utc;
use mutation_types::{
    DeleteMutation, InsertMutation, Mutation, OperationKind, Row, SchemaCatalog,
    SchemaRepository, UpdateMutation, Value,
};
use mypipe_kafka::{
    create_topic_if_not_exists, ConsumerConfig, Flow, KafkaPublisher, KafkaSubscriber,
    ProducerConfig, TopicNaming, TypedConsumer, TypedProducer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Kafka broker address for testing
const KAFKA_BROKER: &str = "kafka:9092";

const CATALOG: &str = r#"
tables:
  - database: mypipe
    table: user
    primary_key: [id]
    columns:
      - { name: id, type: int32 }
      - { name: username, type: text }
      - { name: login_count, type: int32 }
      - { name: bio, type: bytes, nullable: true }
"#;

fn user(username: &str, login_count: i32, bio: &[u8]) -> Row {
    Row::new()
        .with("id", 1)
        .with("username", username)
        .with("login_count", login_count)
        .with("bio", bio.to_vec())
}

#[tokio::test]
#[ignore = "requires a Kafka broker at kafka:9092"]
async fn test_kafka_typed_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter("mypipe=debug,mypipe_kafka=debug")
        .try_init()
        .ok();

    let test_id = Utc::now().timestamp_millis();
    let naming = TopicNaming::new(format!("test-{{database}}-{{table}}-{test_id}"))?;
    let topic = naming.topic("mypipe", "user");
    tracing::info!("Using topic: {}", topic);

    // Step 1: Create the topic
    create_topic_if_not_exists(KAFKA_BROKER, &topic, 3).await?;
    sleep(Duration::from_millis(500)).await;

    // Step 2: Publish the lifecycle of one row
    let catalog = SchemaCatalog::from_yaml(CATALOG)?;
    let publisher = KafkaPublisher::new(&ProducerConfig {
        brokers: KAFKA_BROKER.to_string(),
        ..Default::default()
    })?;
    let producer = TypedProducer::new(
        publisher,
        Arc::new(SchemaRepository::from_catalog(&catalog)?),
        &catalog,
    )?
    .with_topic_naming(naming);

    let mutations: Vec<Mutation> = vec![
        InsertMutation::new("mypipe", "user", user("bob", 5, b"hi")).into(),
        UpdateMutation::new(
            "mypipe",
            "user",
            user("bob", 5, b"hi"),
            user("bob2", 6, b"hello"),
        )
        .into(),
        DeleteMutation::new("mypipe", "user", user("bob2", 6, b"hello")).into(),
    ];
    let mut partitions = Vec::new();
    for mutation in &mutations {
        partitions.push(producer.send(mutation).await?.partition);
    }
    assert!(partitions.windows(2).all(|w| w[0] == w[1]));

    // Step 3: Consume with a repository built independently from the catalog
    let config = ConsumerConfig {
        brokers: KAFKA_BROKER.to_string(),
        group_id: format!("test-group-{test_id}"),
        topic: topic.clone(),
        batch_size: 10,
        poll_timeout: Duration::from_millis(500),
        ..Default::default()
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (on_insert, on_update, on_delete) = (tx.clone(), tx.clone(), tx);
    let handle = TypedConsumer::new(
        KafkaSubscriber::new(config.clone()),
        Arc::new(SchemaRepository::from_catalog(&catalog)?),
        config,
    )
    .on_insert(move |m| {
        on_insert.send(Mutation::from(m))?;
        Ok(Flow::Continue)
    })
    .on_update(move |m| {
        on_update.send(Mutation::from(m))?;
        Ok(Flow::Continue)
    })
    .on_delete(move |m| {
        on_delete.send(Mutation::from(m))?;
        Ok(Flow::StopAfterBatch)
    })
    .start()
    .await?;

    // Step 4: Verify
    let mut received = Vec::new();
    while received.len() < mutations.len() {
        match tokio::time::timeout(Duration::from_secs(30), rx.recv()).await? {
            Some(mutation) => received.push(mutation),
            None => break,
        }
    }

    let kinds: Vec<OperationKind> = received.iter().map(Mutation::kind).collect();
    assert_eq!(
        kinds,
        vec![
            OperationKind::Insert,
            OperationKind::Update,
            OperationKind::Delete
        ]
    );
    assert_eq!(received, mutations);

    if let Mutation::Update(update) = &received[1] {
        let (old, new) = update.change("login_count").unwrap();
        assert_eq!((old, new), (&Value::Int32(5), &Value::Int32(6)));
    }

    let stats = tokio::time::timeout(Duration::from_secs(30), handle.join()).await??;
    assert_eq!(stats.dispatched, 3);
    Ok(())
}
