//! Event normalization
//!
//! Pure transformation from decoded raw events into the stored shape.
//! No I/O and no retained state: the caller supplies the block-timestamp
//! map, pre-populated for every block the batch references.

use crate::event::RawFeeEvent;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use std::collections::HashMap;

/// A fee event in its canonical stored form, minus the store-assigned
/// fields (`created_at`, `seq`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub chain_id: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub block_hash: B256,
    pub token: Address,
    pub integrator: Address,
    /// Canonical decimal string, precision-safe for arbitrary uint256 values
    pub integrator_fee: String,
    pub lifi_fee: String,
    pub block_timestamp: u64,
}

/// Normalize a batch of raw events for one chain.
///
/// `block_timestamps` must contain an entry for every block referenced by
/// `raw_events`; a missing entry is a contract violation by the caller and
/// fails the whole batch.
pub fn normalize_events(
    raw_events: &[RawFeeEvent],
    chain_id: u64,
    block_timestamps: &HashMap<u64, u64>,
) -> Result<Vec<NormalizedEvent>> {
    raw_events
        .iter()
        .map(|raw| {
            let timestamp = block_timestamps.get(&raw.block_number).ok_or_else(|| {
                anyhow::anyhow!(
                    "missing timestamp for block {} referenced by tx {:#x}",
                    raw.block_number,
                    raw.tx_hash
                )
            })?;
            Ok(NormalizedEvent {
                chain_id,
                tx_hash: raw.tx_hash,
                log_index: raw.log_index,
                block_number: raw.block_number,
                block_hash: raw.block_hash,
                token: raw.token,
                integrator: raw.integrator,
                integrator_fee: raw.integrator_fee.to_string(),
                lifi_fee: raw.lifi_fee.to_string(),
                block_timestamp: *timestamp,
            })
        })
        .collect()
}
