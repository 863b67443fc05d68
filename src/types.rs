//! Ethereum JSON-RPC types
//!
//! Type definitions for block headers and log entries returned from
//! Ethereum JSON-RPC endpoints. All numeric fields arrive as hex strings
//! and are parsed into native types at the deserialization boundary.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer};

/// Block header with the fields the sync engine needs.
///
/// Fetched via `eth_getBlockByNumber` with transaction hydration off.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockHeader {
    /// Block number (hex string in JSON, parsed to u64)
    #[serde(rename = "number", deserialize_with = "deserialize_hex_u64")]
    pub number: u64,

    /// Block hash (hex string in JSON)
    #[serde(rename = "hash", deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    /// Block timestamp in unix seconds (hex string in JSON)
    #[serde(rename = "timestamp", deserialize_with = "deserialize_hex_u64")]
    pub timestamp: u64,
}

/// Log entry returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    /// Address of the contract that emitted the log
    #[serde(rename = "address", deserialize_with = "deserialize_hex_address")]
    pub address: Address,

    /// Indexed topics (topic0 = event signature, topics[1..] = indexed params)
    #[serde(rename = "topics", deserialize_with = "deserialize_hex_b256_vec")]
    pub topics: Vec<B256>,

    /// Non-indexed event data (hex string)
    #[serde(rename = "data", deserialize_with = "deserialize_hex_bytes")]
    pub data: Vec<u8>,

    /// Block that contains this log (hex string in JSON)
    #[serde(rename = "blockNumber", deserialize_with = "deserialize_hex_u64")]
    pub block_number: u64,

    /// Hash of the block that contains this log
    #[serde(rename = "blockHash", deserialize_with = "deserialize_hex_b256")]
    pub block_hash: B256,

    /// Hash of the transaction that emitted this log
    #[serde(rename = "transactionHash", deserialize_with = "deserialize_hex_b256")]
    pub transaction_hash: B256,

    /// Position of this log within the block (hex string in JSON)
    #[serde(rename = "logIndex", deserialize_with = "deserialize_hex_u64")]
    pub log_index: u64,

    /// Set by some clients for logs from reorged-out blocks
    #[serde(rename = "removed", default)]
    pub removed: bool,
}

// Hex deserialization helpers

/// Pad an odd-length hex string with a leading zero.
/// This handles cases where RPC returns hex strings without leading zeros.
fn pad_hex_string(s: &str) -> String {
    if s.is_empty() {
        return s.to_string();
    }
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Deserialize a hex string to u64.
fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    u64::from_str_radix(s, 16).map_err(serde::de::Error::custom)
}

/// Deserialize a hex string to B256.
fn deserialize_hex_b256<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_b256(&s).map_err(serde::de::Error::custom)
}

/// Deserialize a list of hex strings to B256 values.
fn deserialize_hex_b256_vec<'de, D>(deserializer: D) -> Result<Vec<B256>, D::Error>
where
    D: Deserializer<'de>,
{
    let strings = Vec::<String>::deserialize(deserializer)?;
    strings
        .iter()
        .map(|s| parse_b256(s).map_err(serde::de::Error::custom))
        .collect()
}

/// Deserialize a hex string to Address.
fn deserialize_hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_address(&s).map_err(serde::de::Error::custom)
}

/// Deserialize a hex string to bytes.
fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    if s.is_empty() {
        Ok(Vec::new())
    } else {
        let s = pad_hex_string(s);
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse a 32-byte hash from a hex string (with or without 0x prefix).
pub fn parse_b256(s: &str) -> Result<B256, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).map_err(|e| e.to_string())?;
    if bytes.len() != 32 {
        return Err(format!("Expected 32 bytes for hash, got {}", bytes.len()));
    }
    Ok(B256::from_slice(&bytes))
}

/// Parse an address from a hex string (with or without 0x prefix).
pub fn parse_address(s: &str) -> Result<Address, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).map_err(|e| e.to_string())?;
    if bytes.len() != 20 {
        return Err(format!(
            "Address must be 20 bytes (40 hex chars), got {} bytes",
            bytes.len()
        ));
    }
    Ok(Address::from_slice(&bytes))
}

/// Decode a 32-byte big-endian word from log data at the given offset.
pub fn word_at(data: &[u8], offset: usize) -> Option<U256> {
    let end = offset.checked_add(32)?;
    if data.len() < end {
        return None;
    }
    Some(U256::from_be_slice(&data[offset..end]))
}
