//! Key encoding and decoding utilities
//!
//! All keys use a single-byte prefix followed by binary data.
//! Big-endian integers keep keys lexicographically ordered in RocksDB,
//! which the rollback deletes and the integrator index scans rely on.

use alloy_primitives::{Address, B256};

/// Encode a sync-state key.
///
/// Format: byte 'S' (0x53) + chain_id (8 bytes, big-endian)
/// Total length: 9 bytes
pub fn encode_sync_state_key(chain_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(b'S');
    key.extend_from_slice(&chain_id.to_be_bytes());
    key
}

/// Encode an event key.
///
/// Format: byte 'E' (0x45) + chain_id (8) + tx_hash (32) + log_index (8)
/// Total length: 49 bytes
///
/// chain_id leads so all of a chain's events form one contiguous range.
pub fn encode_event_key(chain_id: u64, tx_hash: B256, log_index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(49);
    key.push(b'E');
    key.extend_from_slice(&chain_id.to_be_bytes());
    key.extend_from_slice(tx_hash.as_slice());
    key.extend_from_slice(&log_index.to_be_bytes());
    key
}

/// Prefix covering every event key for one chain.
pub fn event_chain_prefix(chain_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(b'E');
    key.extend_from_slice(&chain_id.to_be_bytes());
    key
}

/// Encode an integrator-index key.
///
/// Format: byte 'I' (0x49) + integrator (20) + block_number (8)
///         + log_index (8) + seq (8)
/// Total length: 45 bytes
///
/// A prefix scan over one integrator yields events in ascending
/// `(block_number, log_index, seq)` order across all chains; the chain
/// filter is applied to the pointed-to record during iteration.
pub fn encode_integrator_index_key(
    integrator: Address,
    block_number: u64,
    log_index: u64,
    seq: u64,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(45);
    key.push(b'I');
    key.extend_from_slice(integrator.as_slice());
    key.extend_from_slice(&block_number.to_be_bytes());
    key.extend_from_slice(&log_index.to_be_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Prefix covering every index entry for one integrator.
pub fn integrator_index_prefix(integrator: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'I');
    key.extend_from_slice(integrator.as_slice());
    key
}

/// Decode the `(block_number, log_index, seq)` triple from an
/// integrator-index key. Returns `None` for malformed keys.
pub fn decode_integrator_index_key(key: &[u8]) -> Option<(u64, u64, u64)> {
    if key.len() != 45 || key[0] != b'I' {
        return None;
    }
    let block_number = u64::from_be_bytes(key[21..29].try_into().ok()?);
    let log_index = u64::from_be_bytes(key[29..37].try_into().ok()?);
    let seq = u64::from_be_bytes(key[37..45].try_into().ok()?);
    Some((block_number, log_index, seq))
}

/// Encode a chain-lock key.
///
/// Format: byte 'L' (0x4C) + chain_id (8 bytes, big-endian)
/// Total length: 9 bytes
pub fn encode_lock_key(chain_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(b'L');
    key.extend_from_slice(&chain_id.to_be_bytes());
    key
}

/// Encode a meta key.
///
/// Format: byte 'M' (0x4D) + meta_id (1 byte)
/// Total length: 2 bytes
///
/// Meta IDs:
/// - 0x01: next event seq counter
pub fn encode_meta_key(meta_id: u8) -> Vec<u8> {
    vec![b'M', meta_id]
}
