//! Record types for indexed fee data
//!
//! These structs represent the data stored in the fee store.
//! They use postcard for binary serialization, which is compact and deterministic.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Per-chain sync checkpoint.
///
/// Absence of a record means the chain has never been synced; the engine
/// then starts scanning at the configured start block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateRecord {
    /// Highest block number fully scanned and checkpointed
    pub last_processed_block: u64,
    /// Hash of `last_processed_block` at checkpoint time.
    ///
    /// `None` after a reorg rollback: there is nothing meaningful to
    /// compare against, so the next cycle skips reorg detection once.
    pub last_processed_block_hash: Option<B256>,
}

/// A stored fee collection event.
///
/// Uniquely identified by `(chain_id, tx_hash, log_index)`; never updated
/// in place, deleted only by reorg rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Chain the event was observed on
    pub chain_id: u64,
    /// Transaction that emitted the event
    pub tx_hash: B256,
    /// Position of the log within the block
    pub log_index: u64,
    /// Block that contains the event
    pub block_number: u64,
    /// Hash of that block at scan time
    pub block_hash: B256,
    /// Token the fee was collected in
    pub token: Address,
    /// Integrator the fee was collected for
    pub integrator: Address,
    /// Integrator's fee share as a canonical decimal string
    pub integrator_fee: String,
    /// Platform's fee share as a canonical decimal string
    pub lifi_fee: String,
    /// Timestamp of the containing block (unix seconds)
    pub block_timestamp: u64,
    /// Store-assigned insertion time (unix seconds), immutable
    pub created_at: u64,
    /// Store-assigned monotonic insertion id, the tiebreaker in query
    /// ordering and pagination cursors
    pub seq: u64,
}

/// Lease record granting one worker exclusive sync rights for a chain.
///
/// An expired record is logically absent: any claimant may take it over
/// without the previous owner releasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Opaque identity of the holding worker process
    pub owner_id: String,
    /// Absolute expiry of the lease (unix milliseconds)
    pub expires_at_ms: u64,
}

impl LockRecord {
    /// Whether the lease has expired as of `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms <= now_ms
    }
}
