//! Chain registry loading
//!
//! The registry is a JSON file listing every chain the worker may sync:
//! endpoint, contract, starting block, and per-chain tuning knobs. Which
//! of the listed chains actually run is decided at the CLI.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Settings for one chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSettings {
    /// Numeric chain id (e.g. 137 for Polygon)
    pub chain_id: u64,
    /// Human-readable name used in logs
    pub name: String,
    /// JSON-RPC endpoint URL
    pub rpc_url: String,
    /// Fee collector contract address
    pub contract_address: Address,
    /// First block the contract could have emitted events in
    pub start_block: u64,
    /// Blocks required on top of a block before it is scanned
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// How far to rewind past the checkpoint when a reorg is detected
    #[serde(default = "default_reorg_backtrack")]
    pub reorg_backtrack: u64,
    /// Maximum blocks per eth_getLogs request
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Pause between batches, throttling RPC request rate
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Attempts per RPC call before the cycle fails
    #[serde(default = "default_rpc_max_attempts")]
    pub rpc_max_attempts: u32,
    /// Backoff before the first RPC retry (doubles per attempt)
    #[serde(default = "default_rpc_retry_delay_ms")]
    pub rpc_retry_delay_ms: u64,
}

fn default_confirmations() -> u64 {
    12
}

fn default_reorg_backtrack() -> u64 {
    50
}

fn default_batch_size() -> u64 {
    2_000
}

fn default_batch_delay_ms() -> u64 {
    200
}

fn default_rpc_max_attempts() -> u32 {
    3
}

fn default_rpc_retry_delay_ms() -> u64 {
    1_000
}

impl ChainSettings {
    /// Inter-batch throttle delay.
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Initial RPC retry backoff.
    pub fn rpc_retry_delay(&self) -> Duration {
        Duration::from_millis(self.rpc_retry_delay_ms)
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    chains: Vec<ChainSettings>,
}

/// Load the chain registry from a JSON file.
pub fn load_registry(path: &Path) -> Result<Vec<ChainSettings>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read chain registry: {:?}", path))?;
    let registry: RegistryFile =
        serde_json::from_str(&contents).context("Failed to parse chain registry")?;

    if registry.chains.is_empty() {
        anyhow::bail!("Chain registry is empty");
    }
    for chain in &registry.chains {
        if chain.batch_size == 0 {
            anyhow::bail!("Chain {} has batchSize 0", chain.chain_id);
        }
        if chain.rpc_max_attempts == 0 {
            anyhow::bail!("Chain {} has rpcMaxAttempts 0", chain.chain_id);
        }
    }
    let mut ids: Vec<u64> = registry.chains.iter().map(|c| c.chain_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != registry.chains.len() {
        anyhow::bail!("Chain registry contains duplicate chain ids");
    }

    Ok(registry.chains)
}

/// Restrict a registry to an explicit chain-id selection.
///
/// Selecting a chain the registry does not know is an error; an empty
/// selection means "all registered chains".
pub fn select_chains(chains: Vec<ChainSettings>, selection: &[u64]) -> Result<Vec<ChainSettings>> {
    if selection.is_empty() {
        return Ok(chains);
    }
    let mut selected = Vec::with_capacity(selection.len());
    for id in selection {
        let chain = chains
            .iter()
            .find(|c| c.chain_id == *id)
            .with_context(|| format!("Chain {} is not in the registry", id))?;
        selected.push(chain.clone());
    }
    Ok(selected)
}
