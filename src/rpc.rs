//! JSON-RPC client for Ethereum nodes
//!
//! Provides the chain-read operations the sync engine needs, behind the
//! [`ChainReader`] trait so engine and worker tests can run against a
//! scripted chain. Chain-specific wiring (endpoint URL, contract address)
//! is fixed at construction time.

use crate::event::{decode_fees_collected, fees_collected_topic, RawFeeEvent};
use crate::types::{BlockHeader, LogEntry};
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Read-only view of one chain.
///
/// Exactly the three operations the sync engine consumes. `block_by_number`
/// reports an unknown block as `Ok(None)`: absence is data, not an error,
/// so retry wrappers never retry it.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current chain tip height.
    async fn latest_block_number(&self) -> Result<u64>;

    /// Header of the given block, or `None` if the node does not know it.
    async fn block_by_number(&self, number: u64) -> Result<Option<BlockHeader>>;

    /// Decoded fee events emitted by the wired contract in `[from, to]`.
    async fn logs_in_range(&self, from: u64, to: u64) -> Result<Vec<RawFeeEvent>>;
}

/// JSON-RPC implementation of [`ChainReader`].
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    contract: Address,
    topic0: B256,
}

impl RpcClient {
    /// Create a client wired to one chain's endpoint and fee collector
    /// contract.
    pub fn new(url: String, contract: Address) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            contract,
            topic0: fees_collected_topic(),
        }
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .context("Failed to send RPC request")?;

        let json: Value = response
            .json()
            .await
            .context("Failed to parse RPC response")?;

        // Check for RPC error
        if let Some(error) = json.get("error") {
            anyhow::bail!("RPC error: {}", error);
        }

        // Extract result
        json.get("result")
            .cloned()
            .context("RPC response missing 'result' field")
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn latest_block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number_str = result
            .as_str()
            .context("Block number response is not a string")?;
        let number_str = number_str.strip_prefix("0x").unwrap_or(number_str);
        if number_str.is_empty() {
            anyhow::bail!("Block number is empty");
        }
        u64::from_str_radix(number_str, 16).context("Failed to parse block number")
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<BlockHeader>> {
        let params = json!([format!("0x{:x}", number), false]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        let header = serde_json::from_value(result).context("Failed to deserialize block header")?;
        Ok(Some(header))
    }

    async fn logs_in_range(&self, from: u64, to: u64) -> Result<Vec<RawFeeEvent>> {
        let params = json!([{
            "address": format!("0x{:x}", self.contract),
            "topics": [format!("0x{:x}", self.topic0)],
            "fromBlock": format!("0x{:x}", from),
            "toBlock": format!("0x{:x}", to),
        }]);
        let result = self.call("eth_getLogs", params).await?;
        let logs: Vec<LogEntry> =
            serde_json::from_value(result).context("Failed to deserialize logs")?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            if log.removed {
                tracing::debug!(
                    "skipping removed log at block {} index {}",
                    log.block_number,
                    log.log_index
                );
                continue;
            }
            events.push(decode_fees_collected(log).with_context(|| {
                format!(
                    "Failed to decode FeesCollected log in tx {:#x}",
                    log.transaction_hash
                )
            })?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_client_wires_fees_collected_topic() {
        let client = RpcClient::new(
            "http://127.0.0.1:8545".to_string(),
            address!("bd6c7b0d2f68c2b7805d88388319cfb6ecb50ea9"),
        );
        assert_eq!(client.topic0, fees_collected_topic());
        assert_eq!(
            format!("0x{:x}", client.contract),
            "0xbd6c7b0d2f68c2b7805d88388319cfb6ecb50ea9"
        );
    }
}
