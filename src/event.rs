//! FeesCollected event decoding
//!
//! Decodes raw `eth_getLogs` entries for the fee collector contract's
//! `FeesCollected(address,address,uint256,uint256)` event into typed
//! values. The token and integrator addresses are indexed topics; the two
//! fee amounts are packed in the data section.

use crate::types::{word_at, LogEntry};
use alloy_primitives::{keccak256, Address, B256, U256};
use anyhow::Result;

/// Solidity signature of the fee collection event.
pub const FEES_COLLECTED_SIGNATURE: &str = "FeesCollected(address,address,uint256,uint256)";

/// topic0 value identifying a `FeesCollected` log.
pub fn fees_collected_topic() -> B256 {
    keccak256(FEES_COLLECTED_SIGNATURE.as_bytes())
}

/// A decoded fee collection event, still tied to its on-chain location.
///
/// This is the raw-event shape handed to the normalizer; it carries no
/// chain id and no block timestamp yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeeEvent {
    /// Block that contains the event
    pub block_number: u64,
    /// Hash of that block as reported alongside the log
    pub block_hash: B256,
    /// Transaction that emitted the event
    pub tx_hash: B256,
    /// Position of the log within the block
    pub log_index: u64,
    /// Token the fee was collected in (indexed topic 1)
    pub token: Address,
    /// Integrator the fee was collected for (indexed topic 2)
    pub integrator: Address,
    /// Share of the fee owed to the integrator
    pub integrator_fee: U256,
    /// Share of the fee kept by the platform
    pub lifi_fee: U256,
}

/// Decode a `FeesCollected` log entry.
///
/// The caller only queries logs filtered on [`fees_collected_topic`], so a
/// log that fails to decode is a hard error, not something to skip.
pub fn decode_fees_collected(log: &LogEntry) -> Result<RawFeeEvent> {
    if log.topics.len() != 3 {
        anyhow::bail!(
            "FeesCollected log in tx {:#x} has {} topics, expected 3",
            log.transaction_hash,
            log.topics.len()
        );
    }
    if log.topics[0] != fees_collected_topic() {
        anyhow::bail!(
            "log in tx {:#x} has unexpected topic0 {:#x}",
            log.transaction_hash,
            log.topics[0]
        );
    }

    // Indexed address parameters are left-padded to 32 bytes.
    let token = Address::from_slice(&log.topics[1].as_slice()[12..]);
    let integrator = Address::from_slice(&log.topics[2].as_slice()[12..]);

    let integrator_fee = word_at(&log.data, 0).ok_or_else(|| {
        anyhow::anyhow!(
            "FeesCollected log in tx {:#x} has truncated data ({} bytes)",
            log.transaction_hash,
            log.data.len()
        )
    })?;
    let lifi_fee = word_at(&log.data, 32).ok_or_else(|| {
        anyhow::anyhow!(
            "FeesCollected log in tx {:#x} has truncated data ({} bytes)",
            log.transaction_hash,
            log.data.len()
        )
    })?;

    Ok(RawFeeEvent {
        block_number: log.block_number,
        block_hash: log.block_hash,
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        token,
        integrator,
        integrator_fee,
        lifi_fee,
    })
}
