//! CLI implementation for feectl
//!
//! Operator interface over the fee store: inspect sync checkpoints,
//! query stored events with cursor pagination, and manage lock leases.
//! All commands output pretty JSON.

use crate::query::{fetch_events, EventQuery};
use crate::records::EventRecord;
use crate::store::{FeeStore, RocksFeeStore};
use crate::types::parse_address;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fee store CLI tool
#[derive(Parser)]
#[command(name = "feectl")]
#[command(about = "Fee event store CLI tool")]
pub struct Cli {
    /// Path to the RocksDB database directory
    #[arg(short, long, default_value = "./fee_db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show sync checkpoints and event counts
    Status {
        /// Restrict to one chain id
        #[arg(long)]
        chain: Option<u64>,
    },
    /// Query stored events for an integrator
    Events {
        /// Integrator address (hex, with or without 0x prefix)
        #[arg(long)]
        integrator: String,
        /// Restrict to one chain id
        #[arg(long)]
        chain: Option<u64>,
        /// Cursor from a previous page
        #[arg(long)]
        cursor: Option<String>,
        /// Page size (clamped to 1..=200, default 50)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List chain lock leases
    Locks,
    /// Delete expired chain lock leases
    PurgeLocks,
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Render an event the way the query API exposes it.
fn event_json(event: &EventRecord) -> serde_json::Value {
    json!({
        "chain_id": event.chain_id,
        "tx_hash": format!("0x{:x}", event.tx_hash),
        "log_index": event.log_index,
        "block_number": event.block_number,
        "block_hash": format!("0x{:x}", event.block_hash),
        "token": format!("0x{:x}", event.token),
        "integrator": format!("0x{:x}", event.integrator),
        "integrator_fee": event.integrator_fee,
        "lifi_fee": event.lifi_fee,
        "block_timestamp": event.block_timestamp,
        "created_at": event.created_at,
    })
}

/// Run the CLI command and print JSON output.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = RocksFeeStore::open(&cli.db_path)
        .with_context(|| format!("Failed to open database at {:?}", cli.db_path))?;

    let result = match cli.command {
        Commands::Status { chain } => {
            let states = store.list_sync_states()?;
            let mut rows = Vec::new();
            for (chain_id, state) in states {
                if let Some(only) = chain {
                    if chain_id != only {
                        continue;
                    }
                }
                rows.push(json!({
                    "chain_id": chain_id,
                    "last_processed_block": state.last_processed_block,
                    "last_processed_block_hash": state
                        .last_processed_block_hash
                        .map(|h| format!("0x{:x}", h)),
                    "events": store.count_events(chain_id)?,
                }));
            }
            json!({ "chains": rows })
        }
        Commands::Events {
            integrator,
            chain,
            cursor,
            limit,
        } => {
            let integrator = parse_address(&integrator)
                .map_err(|e| anyhow::anyhow!("Invalid integrator address: {}", e))?;
            let page = fetch_events(
                &store,
                &EventQuery {
                    integrator,
                    chain_id: chain,
                    cursor,
                    limit,
                },
            )?;
            json!({
                "events": page.events.iter().map(event_json).collect::<Vec<_>>(),
                "next_cursor": page.next_cursor,
            })
        }
        Commands::Locks => {
            let now_ms = unix_now_ms();
            let locks = store.list_locks()?;
            json!({
                "locks": locks
                    .iter()
                    .map(|(chain_id, lock)| {
                        json!({
                            "chain_id": chain_id,
                            "owner_id": lock.owner_id,
                            "expires_at_ms": lock.expires_at_ms,
                            "expired": lock.is_expired(now_ms),
                        })
                    })
                    .collect::<Vec<_>>()
            })
        }
        Commands::PurgeLocks => {
            let purged = store.purge_expired_locks(unix_now_ms())?;
            json!({ "status": "ok", "purged": purged })
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
