use crate::{CatalogOpts, KafkaOpts};
use clap::Args;
use mypipe_kafka::create_topic_if_not_exists;

/// Arguments for `mypipe create-topics`
#[derive(Args, Clone, Debug)]
pub struct CreateTopicsArgs {
    #[command(flatten)]
    pub kafka: KafkaOpts,

    #[command(flatten)]
    pub catalog: CatalogOpts,

    /// Partitions per topic
    #[arg(long, default_value = "3")]
    pub partitions: i32,
}

/// Create the topic of every catalog table.
pub async fn run_create_topics(args: CreateTopicsArgs) -> anyhow::Result<()> {
    let (catalog, naming) = args.catalog.load()?;

    for table in &catalog.tables {
        let topic = naming.topic(&table.database, &table.table);
        create_topic_if_not_exists(&args.kafka.kafka_brokers, &topic, args.partitions).await?;
    }

    Ok(())
}
