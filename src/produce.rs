use crate::events::{read_events, replay};
use crate::{CatalogOpts, KafkaOpts};
use anyhow::Context;
use clap::Args;
use mutation_types::SchemaRepository;
use mypipe_kafka::{KafkaPublisher, TypedProducer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Arguments for `mypipe produce`
#[derive(Args, Clone, Debug)]
pub struct ProduceArgs {
    #[command(flatten)]
    pub kafka: KafkaOpts,

    #[command(flatten)]
    pub catalog: CatalogOpts,

    /// JSON-lines file of mutation events to publish
    #[arg(long, short = 'e')]
    pub events: PathBuf,
}

/// Publish every event of the events file through a typed producer.
pub async fn run_produce(args: ProduceArgs) -> anyhow::Result<()> {
    let (catalog, naming) = args.catalog.load()?;
    let repository = Arc::new(
        SchemaRepository::from_catalog(&catalog).context("Failed to register catalog schemas")?,
    );
    info!(
        "Registered {} schemas for {} tables",
        repository.len(),
        catalog.tables.len()
    );

    let events = read_events(&args.events)?;

    let publisher = KafkaPublisher::new(&args.kafka.producer_config())?;
    let producer =
        TypedProducer::new(publisher, repository, &catalog)?.with_topic_naming(naming);

    let count = replay(&events, &catalog, &producer).await?;
    info!(
        "Published {} mutations to {}",
        count, args.kafka.kafka_brokers
    );
    Ok(())
}
