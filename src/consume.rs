use crate::events::MutationEvent;
use crate::{CatalogOpts, KafkaOpts};
use anyhow::{anyhow, bail};
use clap::Args;
use mutation_types::{Mutation, SchemaRepository};
use mypipe_kafka::{ConsumerConfig, ConsumerHandle, Flow, KafkaSubscriber, Subscriber, TypedConsumer};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Arguments for `mypipe consume`
#[derive(Args, Clone, Debug)]
pub struct ConsumeArgs {
    #[command(flatten)]
    pub kafka: KafkaOpts,

    #[command(flatten)]
    pub catalog: CatalogOpts,

    /// Database of the table to consume
    #[arg(long)]
    pub database: String,

    /// Table to consume
    #[arg(long)]
    pub table: String,

    /// Consumer group ID
    #[arg(long, default_value = "mypipe-consumer")]
    pub group_id: String,

    /// Maximum messages dispatched per batch
    #[arg(long, default_value = "100")]
    pub batch_size: usize,

    /// How long one poll waits for messages, in milliseconds
    #[arg(long, default_value = "500")]
    pub poll_timeout_ms: u64,

    /// Stop after printing this many mutations
    #[arg(long)]
    pub max_messages: Option<u64>,
}

/// Print the mutations of one table until Ctrl-C or `--max-messages`.
pub async fn run_consume(args: ConsumeArgs) -> anyhow::Result<()> {
    let (catalog, naming) = args.catalog.load()?;
    if catalog.get_table(&args.database, &args.table).is_none() {
        bail!(
            "Table {}.{} is not in the schema catalog",
            args.database,
            args.table
        );
    }

    // Same catalog, same ids as the producer
    let repository = Arc::new(SchemaRepository::from_catalog(&catalog)?);

    let config = ConsumerConfig {
        brokers: args.kafka.kafka_brokers.clone(),
        group_id: args.group_id.clone(),
        topic: naming.topic(&args.database, &args.table),
        batch_size: args.batch_size,
        poll_timeout: Duration::from_millis(args.poll_timeout_ms),
        ..Default::default()
    };
    let subscriber = KafkaSubscriber::new(config.clone());
    let out = Arc::new(Mutex::new(std::io::stdout()));

    let handle = start_printer(subscriber, repository, config, args.max_messages, out).await?;

    let stop = handle.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping consumer");
            stop.cancel();
        }
    });

    let stats = handle.join().await?;
    info!(
        "Consumed {} mutations in {} batches ({} skipped, {} callback failures)",
        stats.dispatched, stats.batches, stats.skipped, stats.callback_failures
    );
    Ok(())
}

/// Start a consumer writing each mutation to `out` as one JSON line.
///
/// With `max_messages`, the consumer stops after the batch in which that many
/// mutations were printed.
pub async fn start_printer<S, W>(
    subscriber: S,
    repository: Arc<SchemaRepository>,
    config: ConsumerConfig,
    max_messages: Option<u64>,
    out: Arc<Mutex<W>>,
) -> mypipe_kafka::Result<ConsumerHandle>
where
    S: Subscriber,
    W: Write + Send + 'static,
{
    let printer = LinePrinter {
        out,
        printed: Arc::new(AtomicU64::new(0)),
        max_messages,
    };

    let (on_insert, on_update, on_delete) = (printer.clone(), printer.clone(), printer);
    TypedConsumer::new(subscriber, repository, config)
        .on_insert(move |m| on_insert.print(m.into()))
        .on_update(move |m| on_update.print(m.into()))
        .on_delete(move |m| on_delete.print(m.into()))
        .start()
        .await
}

struct LinePrinter<W> {
    out: Arc<Mutex<W>>,
    printed: Arc<AtomicU64>,
    max_messages: Option<u64>,
}

impl<W> Clone for LinePrinter<W> {
    fn clone(&self) -> Self {
        Self {
            out: Arc::clone(&self.out),
            printed: Arc::clone(&self.printed),
            max_messages: self.max_messages,
        }
    }
}

impl<W: Write> LinePrinter<W> {
    fn print(&self, mutation: Mutation) -> anyhow::Result<Flow> {
        let line = serde_json::to_string(&MutationEvent::from(&mutation))?;
        {
            let mut out = self
                .out
                .lock()
                .map_err(|_| anyhow!("Output writer lock poisoned"))?;
            writeln!(out, "{line}")?;
            out.flush()?;
        }

        let printed = self.printed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(match self.max_messages {
            Some(max) if printed >= max => Flow::StopAfterBatch,
            _ => Flow::Continue,
        })
    }
}
