//! Command-line interface for mypipe
//!
//! # Usage Examples
//!
//! ```bash
//! # Create one topic per table of the catalog
//! mypipe create-topics --catalog demos/user_catalog.yaml
//!
//! # Publish insert/update/delete events
//! mypipe produce \
//!   --catalog demos/user_catalog.yaml \
//!   --events demos/user_events.jsonl
//!
//! # Print mutations of mypipe.user until Ctrl-C
//! mypipe consume \
//!   --catalog demos/user_catalog.yaml \
//!   --database mypipe --table user \
//!   --group-id demo
//! ```
//!
//! The broker list defaults to `localhost:9092` and can be set with
//! `--kafka-brokers` or `KAFKA_BROKERS`.

use clap::{Parser, Subcommand};
use mypipe::consume::{run_consume, ConsumeArgs};
use mypipe::produce::{run_produce, ProduceArgs};
use mypipe::topics::{run_create_topics, CreateTopicsArgs};

#[derive(Parser)]
#[command(name = "mypipe")]
#[command(about = "Stream schema-tagged row mutations through Kafka")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish mutation events from a JSON-lines file
    Produce(ProduceArgs),

    /// Consume one table's topic and print mutations as JSON lines
    Consume(ConsumeArgs),

    /// Create the topic of every table in the schema catalog
    CreateTopics(CreateTopicsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Produce(args) => run_produce(args).await,
        Commands::Consume(args) => run_consume(args).await,
        Commands::CreateTopics(args) => run_create_topics(args).await,
    }
}
