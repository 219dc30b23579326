//! Scan processor binary

use clap::{Parser, Subcommand};
use scan_processor::common::{ProcessorConfig, StoreBackend};
use scan_processor::ingest::{MemoryQueue, MessageDispatcher};
use scan_processor::store::{self, schema::ScanRow, RowFilter};
use scan_processor::{RetryPolicy, RowKey, WriteCoordinator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scan-processor")]
#[command(about = "Last-writer-wins scan ingestion", version)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store directory (sled backend)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Store backend
    #[arg(long, global = true, value_parser = parse_backend)]
    backend: Option<StoreBackend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest newline-delimited JSON envelopes
    Ingest {
        /// Input file, or `-` for stdin
        #[arg(long, default_value = "-")]
        input: String,

        /// Concurrent handlers
        #[arg(long)]
        max_in_flight: Option<usize>,

        /// Write attempts per message
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Print the stored row for a key as JSON
    Get {
        ip: String,
        port: u32,
        service: String,
    },
    /// Open the store and run its health check
    Check,
}

fn parse_backend(s: &str) -> Result<StoreBackend, String> {
    match s {
        "memory" => Ok(StoreBackend::Memory),
        "sled" => Ok(StoreBackend::Sled),
        other => Err(format!("unknown backend: {} (expected memory or sled)", other)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config from file and environment, then override with CLI arguments
    let mut config = ProcessorConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.store {
        config.store.path = path;
    }
    if let Some(backend) = cli.backend {
        config.store.backend = backend;
    }
    if let Commands::Ingest {
        max_in_flight,
        max_attempts,
        ..
    } = &cli.command
    {
        if let Some(n) = max_in_flight {
            config.dispatcher.max_in_flight = *n;
        }
        if let Some(n) = max_attempts {
            config.dispatcher.max_attempts = *n;
        }
    }
    config.validate()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Fail fast: an unusable store is a startup error
    let row_store = store::open(&config.store)?;
    row_store.health_check().await?;

    match cli.command {
        Commands::Ingest { input, .. } => {
            tracing::info!("Starting scan processor {}", scan_processor::VERSION);
            tracing::info!("  Store: {:?} at {}", config.store.backend, config.store.path.display());
            tracing::info!("  Max in flight: {}", config.dispatcher.max_in_flight);

            let queue = Arc::new(MemoryQueue::new(config.queue.max_deliveries));
            let published = if input == "-" {
                publish_lines(&queue, tokio::io::stdin()).await?
            } else {
                publish_lines(&queue, tokio::fs::File::open(&input).await?).await?
            };
            queue.close();
            tracing::info!("Queued {} messages from {}", published, input);

            let coordinator = Arc::new(WriteCoordinator::with_policy(
                row_store,
                RetryPolicy::new(config.dispatcher.max_attempts),
            ));
            tracing::info!("  Max attempts: {}", coordinator.policy().max_attempts());
            let dispatcher =
                MessageDispatcher::new(queue.clone(), coordinator, config.dispatcher.max_in_flight);

            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, finishing in-flight messages");
                    signal_token.cancel();
                }
            });

            dispatcher.run(shutdown).await?;

            let dead = queue.dead_letters();
            if !dead.is_empty() {
                tracing::warn!("{} message(s) exhausted their deliveries", dead.len());
            }
            println!("{}", serde_json::to_string_pretty(&dispatcher.stats().snapshot())?);
        }
        Commands::Get { ip, port, service } => {
            let key = RowKey::new(&ip, port, &service);
            match row_store.read_row(&key, &RowFilter::PassAll).await? {
                Some(row) => {
                    let row = ScanRow::from_row(&key, &row)?;
                    println!("{}", serde_json::to_string_pretty(&row)?);
                }
                None => anyhow::bail!("no row for key {:?}", key.as_str()),
            }
        }
        Commands::Check => {
            if config.store.backend == StoreBackend::Sled {
                println!("✓ Store healthy at {}", config.store.path.display());
            } else {
                println!("✓ Store healthy (memory)");
            }
        }
    }

    Ok(())
}

async fn publish_lines<R>(queue: &MemoryQueue, reader: R) -> anyhow::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut published = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        queue.publish(line.as_bytes().to_vec())?;
        published += 1;
    }
    Ok(published)
}
