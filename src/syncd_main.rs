//! Fee event sync worker binary
//!
//! Syncs FeesCollected events for every selected chain into the local
//! store, either as a single round (exit non-zero if any chain failed) or
//! continuously on an interval until Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use feesync::config::{load_registry, select_chains};
use feesync::rpc::{ChainReader, RpcClient};
use feesync::store::RocksFeeStore;
use feesync::worker::SyncWorker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fee event sync worker
#[derive(Parser)]
#[command(name = "feesyncd")]
#[command(about = "Index FeesCollected events from configured chains")]
struct Args {
    /// Path to the chain registry JSON file
    #[arg(short, long, default_value = "chains.json")]
    config: PathBuf,

    /// Path to the RocksDB database directory
    #[arg(short, long, default_value = "./fee_db")]
    db_path: PathBuf,

    /// Chain ids to sync (comma-separated); all registered chains if omitted
    #[arg(long, value_delimiter = ',')]
    chains: Vec<u64>,

    /// Run a single round and exit
    #[arg(long)]
    once: bool,

    /// Seconds to sleep between rounds in continuous mode
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// Lock lease TTL in seconds; must exceed the worst-case cycle time
    #[arg(long, default_value_t = 300)]
    lock_ttl: u64,

    /// Worker identity used for lock ownership; defaults to host + pid
    #[arg(long)]
    owner_id: Option<String>,
}

fn default_owner_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    format!("{}-{}", host, std::process::id())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let owner_id = args.owner_id.unwrap_or_else(default_owner_id);

    info!("Starting fee event sync worker");
    info!("Registry: {:?}", args.config);
    info!("Database: {:?}", args.db_path);
    info!("Owner id: {}", owner_id);

    let chains = select_chains(
        load_registry(&args.config).context("Failed to load chain registry")?,
        &args.chains,
    )?;
    info!("Syncing {} chain(s)", chains.len());

    let store = Arc::new(
        RocksFeeStore::open(&args.db_path)
            .with_context(|| format!("Failed to open database at {:?}", args.db_path))?,
    );

    let chain_clients: Vec<_> = chains
        .into_iter()
        .map(|settings| {
            let client: Arc<dyn ChainReader> = Arc::new(RpcClient::new(
                settings.rpc_url.clone(),
                settings.contract_address,
            ));
            (settings, client)
        })
        .collect();

    let worker = SyncWorker::new(
        store,
        chain_clients,
        owner_id,
        Duration::from_secs(args.lock_ttl),
        Duration::from_secs(args.interval),
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            signal_cancel.cancel();
        }
    });

    if args.once {
        worker.run_once(&cancel).await?;
    } else {
        worker.run(&cancel).await?;
    }

    info!("Worker stopped");
    Ok(())
}
