//! FeeStore trait and RocksDB implementation
//!
//! Provides the durable collections behind the sync engine: per-chain
//! sync checkpoints, the fee-event set with its integrator index, and the
//! per-chain lock leases. Uses RocksDB with column families.
//!
//! Event insertion is strictly insert-if-absent keyed on
//! `(chain_id, tx_hash, log_index)`, so re-scanning any block range is
//! safe. Lock and insert read-modify-write paths are serialized behind an
//! internal mutex, which stands in for the atomic conditional writes a
//! client-server store would provide.

use crate::keys::{
    decode_integrator_index_key, encode_event_key, encode_integrator_index_key, encode_lock_key,
    encode_meta_key, encode_sync_state_key, event_chain_prefix, integrator_index_prefix,
};
use crate::normalize::NormalizedEvent;
use crate::records::{EventRecord, LockRecord, SyncStateRecord};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Position of the last event a query page ended at, used to resume
/// iteration strictly after it.
pub type EventPosition = (u64, u64, u64); // (block_number, log_index, seq)

/// Trait defining the interface for the fee-event store.
///
/// Sync checkpoints and events for a chain must only be mutated by the
/// worker currently holding that chain's lock; the query path is
/// read-only.
pub trait FeeStore: Send + Sync {
    /// Get the sync checkpoint for a chain.
    fn get_sync_state(&self, chain_id: u64) -> Result<Option<SyncStateRecord>>;

    /// Upsert the sync checkpoint for a chain.
    fn put_sync_state(&self, chain_id: u64, state: &SyncStateRecord) -> Result<()>;

    /// Delete the sync checkpoint for a chain (rollback past start block).
    fn delete_sync_state(&self, chain_id: u64) -> Result<()>;

    /// List all sync checkpoints, ordered by chain id.
    fn list_sync_states(&self) -> Result<Vec<(u64, SyncStateRecord)>>;

    /// Insert an event if its `(chain_id, tx_hash, log_index)` key is
    /// absent. Returns `true` if inserted, `false` if it already existed.
    fn insert_event(&self, event: &NormalizedEvent) -> Result<bool>;

    /// Get an event by its unique key.
    fn get_event(
        &self,
        chain_id: u64,
        tx_hash: alloy_primitives::B256,
        log_index: u64,
    ) -> Result<Option<EventRecord>>;

    /// Delete all events for a chain with `block_number > block`.
    /// Returns the number of events deleted.
    fn delete_events_above(&self, chain_id: u64, block: u64) -> Result<u64>;

    /// Count stored events for a chain.
    fn count_events(&self, chain_id: u64) -> Result<u64>;

    /// Events for an integrator in ascending `(block_number, log_index,
    /// seq)` order, optionally restricted to one chain, starting strictly
    /// after `after`, at most `limit` results.
    fn events_by_integrator(
        &self,
        integrator: Address,
        chain_id: Option<u64>,
        after: Option<EventPosition>,
        limit: usize,
    ) -> Result<Vec<EventRecord>>;

    /// Try to take the chain lock for `owner_id`.
    ///
    /// Succeeds if no lock row exists, the existing row is already owned
    /// by `owner_id`, or the existing row has expired. Returns `false`
    /// while another live owner holds it.
    fn acquire_lock(&self, chain_id: u64, owner_id: &str, now_ms: u64, ttl_ms: u64)
        -> Result<bool>;

    /// Extend the lease if still owned by `owner_id`. Returns `false` if
    /// the lock was lost.
    fn renew_lock(&self, chain_id: u64, owner_id: &str, now_ms: u64, ttl_ms: u64) -> Result<bool>;

    /// Delete the lock if owned by `owner_id`; silent no-op otherwise.
    fn release_lock(&self, chain_id: u64, owner_id: &str) -> Result<()>;

    /// Get the current lock row for a chain, expired or not.
    fn get_lock(&self, chain_id: u64) -> Result<Option<LockRecord>>;

    /// List all lock rows, ordered by chain id.
    fn list_locks(&self) -> Result<Vec<(u64, LockRecord)>>;

    /// Delete every expired lock row. Returns the number deleted.
    fn purge_expired_locks(&self, now_ms: u64) -> Result<u64>;
}

/// RocksDB-backed implementation of FeeStore.
///
/// Column families:
/// - sync_state: per-chain checkpoints
/// - events: fee events keyed by (chain, tx, log index)
/// - event_index: integrator index keyed by (integrator, block, log index, seq)
/// - locks: per-chain lease rows
/// - meta: the event seq counter
pub struct RocksFeeStore {
    db: DB,
    // Serializes insert-if-absent and lock lease read-modify-write.
    write_guard: Mutex<()>,
}

const META_NEXT_SEQ: u8 = 0x01;

impl RocksFeeStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all required column families if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families = vec![
            ColumnFamilyDescriptor::new("sync_state", Options::default()),
            ColumnFamilyDescriptor::new("events", Options::default()),
            ColumnFamilyDescriptor::new("event_index", Options::default()),
            ColumnFamilyDescriptor::new("locks", Options::default()),
            ColumnFamilyDescriptor::new("meta", Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("Failed to open RocksDB database")?;

        Ok(Self {
            db,
            write_guard: Mutex::new(()),
        })
    }

    /// Get a column family handle by name.
    fn get_cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("Column family '{}' not found", name))
    }

    /// Read and advance the event seq counter. Callers must hold the
    /// write guard.
    fn next_seq(&self, batch: &mut WriteBatch) -> Result<u64> {
        let cf = self.get_cf("meta")?;
        let key = encode_meta_key(META_NEXT_SEQ);
        let next = match self.db.get_cf(cf, &key).context("Failed to get seq counter")? {
            Some(bytes) => {
                if bytes.len() != 8 {
                    anyhow::bail!("Seq counter must be 8 bytes (u64), got {}", bytes.len());
                }
                u64::from_be_bytes(bytes.as_slice().try_into().expect("8 bytes for u64"))
            }
            None => 0,
        };
        batch.put_cf(cf, &key, (next + 1).to_be_bytes());
        Ok(next)
    }

    fn unix_now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Decode the chain id out of an event key (after the 'E' prefix byte).
fn chain_id_from_event_key(key: &[u8]) -> Option<u64> {
    if key.len() != 49 || key[0] != b'E' {
        return None;
    }
    Some(u64::from_be_bytes(key[1..9].try_into().ok()?))
}

/// Decode the chain id out of a 9-byte prefixed key ('S' or 'L').
fn chain_id_from_short_key(key: &[u8]) -> Option<u64> {
    if key.len() != 9 {
        return None;
    }
    Some(u64::from_be_bytes(key[1..9].try_into().ok()?))
}

impl FeeStore for RocksFeeStore {
    fn get_sync_state(&self, chain_id: u64) -> Result<Option<SyncStateRecord>> {
        let cf = self.get_cf("sync_state")?;
        let key = encode_sync_state_key(chain_id);
        match self.db.get_cf(cf, &key).context("Failed to get sync state")? {
            Some(bytes) => {
                let record =
                    postcard::from_bytes(&bytes).context("Failed to deserialize sync state")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn put_sync_state(&self, chain_id: u64, state: &SyncStateRecord) -> Result<()> {
        let cf = self.get_cf("sync_state")?;
        let key = encode_sync_state_key(chain_id);
        let value = postcard::to_allocvec(state).context("Failed to serialize sync state")?;
        self.db
            .put_cf(cf, &key, &value)
            .context("Failed to put sync state")?;
        Ok(())
    }

    fn delete_sync_state(&self, chain_id: u64) -> Result<()> {
        let cf = self.get_cf("sync_state")?;
        let key = encode_sync_state_key(chain_id);
        self.db
            .delete_cf(cf, &key)
            .context("Failed to delete sync state")?;
        Ok(())
    }

    fn list_sync_states(&self) -> Result<Vec<(u64, SyncStateRecord)>> {
        let cf = self.get_cf("sync_state")?;
        let mut states = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item.context("Failed to read iterator")?;
            let chain_id = chain_id_from_short_key(&key)
                .context("Failed to decode sync state key")?;
            let record: SyncStateRecord =
                postcard::from_bytes(&value).context("Failed to deserialize sync state")?;
            states.push((chain_id, record));
        }
        Ok(states)
    }

    fn insert_event(&self, event: &NormalizedEvent) -> Result<bool> {
        let events_cf = self.get_cf("events")?;
        let index_cf = self.get_cf("event_index")?;
        let key = encode_event_key(event.chain_id, event.tx_hash, event.log_index);

        let _guard = self.write_guard.lock().expect("store write guard poisoned");

        if self
            .db
            .get_cf(events_cf, &key)
            .context("Failed to check for existing event")?
            .is_some()
        {
            // Same (chain, tx, log index) already stored: replay of an
            // already-scanned range. Not an error.
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        let seq = self.next_seq(&mut batch)?;
        let record = EventRecord {
            chain_id: event.chain_id,
            tx_hash: event.tx_hash,
            log_index: event.log_index,
            block_number: event.block_number,
            block_hash: event.block_hash,
            token: event.token,
            integrator: event.integrator,
            integrator_fee: event.integrator_fee.clone(),
            lifi_fee: event.lifi_fee.clone(),
            block_timestamp: event.block_timestamp,
            created_at: Self::unix_now_secs(),
            seq,
        };
        let value = postcard::to_allocvec(&record).context("Failed to serialize event")?;
        batch.put_cf(events_cf, &key, &value);

        let index_key = encode_integrator_index_key(
            record.integrator,
            record.block_number,
            record.log_index,
            seq,
        );
        batch.put_cf(index_cf, &index_key, &key);

        self.db.write(batch).context("Failed to write event batch")?;
        Ok(true)
    }

    fn get_event(
        &self,
        chain_id: u64,
        tx_hash: alloy_primitives::B256,
        log_index: u64,
    ) -> Result<Option<EventRecord>> {
        let cf = self.get_cf("events")?;
        let key = encode_event_key(chain_id, tx_hash, log_index);
        match self.db.get_cf(cf, &key).context("Failed to get event")? {
            Some(bytes) => {
                let record = postcard::from_bytes(&bytes).context("Failed to deserialize event")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn delete_events_above(&self, chain_id: u64, block: u64) -> Result<u64> {
        let events_cf = self.get_cf("events")?;
        let index_cf = self.get_cf("event_index")?;
        let prefix = event_chain_prefix(chain_id);

        let mut batch = WriteBatch::default();
        let mut deleted = 0u64;
        let iter = self.db.iterator_cf(
            events_cf,
            rocksdb::IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, value) = item.context("Failed to read iterator")?;
            if !key.starts_with(&prefix) {
                break;
            }
            let record: EventRecord =
                postcard::from_bytes(&value).context("Failed to deserialize event")?;
            if record.block_number <= block {
                continue;
            }
            batch.delete_cf(events_cf, &key);
            batch.delete_cf(
                index_cf,
                encode_integrator_index_key(
                    record.integrator,
                    record.block_number,
                    record.log_index,
                    record.seq,
                ),
            );
            deleted += 1;
        }
        self.db
            .write(batch)
            .context("Failed to write rollback batch")?;
        Ok(deleted)
    }

    fn count_events(&self, chain_id: u64) -> Result<u64> {
        let cf = self.get_cf("events")?;
        let prefix = event_chain_prefix(chain_id);
        let mut count = 0u64;
        let iter = self.db.iterator_cf(
            cf,
            rocksdb::IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, _) = item.context("Failed to read iterator")?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    fn events_by_integrator(
        &self,
        integrator: Address,
        chain_id: Option<u64>,
        after: Option<EventPosition>,
        limit: usize,
    ) -> Result<Vec<EventRecord>> {
        let index_cf = self.get_cf("event_index")?;
        let events_cf = self.get_cf("events")?;
        let prefix = integrator_index_prefix(integrator);

        // Resume strictly after the cursor position: seq + 1 is the next
        // possible key because seq is the last key component.
        let start_key = match after {
            Some((block, log_index, seq)) => {
                encode_integrator_index_key(integrator, block, log_index, seq.saturating_add(1))
            }
            None => prefix.clone(),
        };

        let mut events = Vec::new();
        let iter = self.db.iterator_cf(
            index_cf,
            rocksdb::IteratorMode::From(&start_key, rocksdb::Direction::Forward),
        );
        for item in iter {
            if events.len() >= limit {
                break;
            }
            let (key, event_key) = item.context("Failed to read iterator")?;
            if !key.starts_with(&prefix) {
                break;
            }
            decode_integrator_index_key(&key).context("Failed to decode index key")?;

            if let Some(wanted) = chain_id {
                match chain_id_from_event_key(&event_key) {
                    Some(found) if found == wanted => {}
                    Some(_) => continue,
                    None => anyhow::bail!("Malformed event key in integrator index"),
                }
            }

            let bytes = self
                .db
                .get_cf(events_cf, &event_key)
                .context("Failed to get indexed event")?
                .context("Integrator index points at a missing event")?;
            let record: EventRecord =
                postcard::from_bytes(&bytes).context("Failed to deserialize event")?;
            events.push(record);
        }
        Ok(events)
    }

    fn acquire_lock(
        &self,
        chain_id: u64,
        owner_id: &str,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Result<bool> {
        let cf = self.get_cf("locks")?;
        let key = encode_lock_key(chain_id);

        let _guard = self.write_guard.lock().expect("store write guard poisoned");

        if let Some(bytes) = self.db.get_cf(cf, &key).context("Failed to get lock")? {
            let existing: LockRecord =
                postcard::from_bytes(&bytes).context("Failed to deserialize lock")?;
            // Takeover is only allowed for the same owner (idempotent
            // re-acquire) or once the lease has lapsed.
            if existing.owner_id != owner_id && !existing.is_expired(now_ms) {
                return Ok(false);
            }
        }

        let record = LockRecord {
            owner_id: owner_id.to_string(),
            expires_at_ms: now_ms.saturating_add(ttl_ms),
        };
        let value = postcard::to_allocvec(&record).context("Failed to serialize lock")?;
        self.db
            .put_cf(cf, &key, &value)
            .context("Failed to put lock")?;
        Ok(true)
    }

    fn renew_lock(&self, chain_id: u64, owner_id: &str, now_ms: u64, ttl_ms: u64) -> Result<bool> {
        let cf = self.get_cf("locks")?;
        let key = encode_lock_key(chain_id);

        let _guard = self.write_guard.lock().expect("store write guard poisoned");

        match self.db.get_cf(cf, &key).context("Failed to get lock")? {
            Some(bytes) => {
                let existing: LockRecord =
                    postcard::from_bytes(&bytes).context("Failed to deserialize lock")?;
                if existing.owner_id != owner_id {
                    return Ok(false);
                }
                let record = LockRecord {
                    owner_id: owner_id.to_string(),
                    expires_at_ms: now_ms.saturating_add(ttl_ms),
                };
                let value = postcard::to_allocvec(&record).context("Failed to serialize lock")?;
                self.db
                    .put_cf(cf, &key, &value)
                    .context("Failed to put lock")?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn release_lock(&self, chain_id: u64, owner_id: &str) -> Result<()> {
        let cf = self.get_cf("locks")?;
        let key = encode_lock_key(chain_id);

        let _guard = self.write_guard.lock().expect("store write guard poisoned");

        if let Some(bytes) = self.db.get_cf(cf, &key).context("Failed to get lock")? {
            let existing: LockRecord =
                postcard::from_bytes(&bytes).context("Failed to deserialize lock")?;
            if existing.owner_id == owner_id {
                self.db
                    .delete_cf(cf, &key)
                    .context("Failed to delete lock")?;
            }
        }
        Ok(())
    }

    fn get_lock(&self, chain_id: u64) -> Result<Option<LockRecord>> {
        let cf = self.get_cf("locks")?;
        let key = encode_lock_key(chain_id);
        match self.db.get_cf(cf, &key).context("Failed to get lock")? {
            Some(bytes) => {
                let record = postcard::from_bytes(&bytes).context("Failed to deserialize lock")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list_locks(&self) -> Result<Vec<(u64, LockRecord)>> {
        let cf = self.get_cf("locks")?;
        let mut locks = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item.context("Failed to read iterator")?;
            let chain_id =
                chain_id_from_short_key(&key).context("Failed to decode lock key")?;
            let record: LockRecord =
                postcard::from_bytes(&value).context("Failed to deserialize lock")?;
            locks.push((chain_id, record));
        }
        Ok(locks)
    }

    fn purge_expired_locks(&self, now_ms: u64) -> Result<u64> {
        let cf = self.get_cf("locks")?;

        let _guard = self.write_guard.lock().expect("store write guard poisoned");

        let mut batch = WriteBatch::default();
        let mut purged = 0u64;
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item.context("Failed to read iterator")?;
            let record: LockRecord =
                postcard::from_bytes(&value).context("Failed to deserialize lock")?;
            if record.is_expired(now_ms) {
                batch.delete_cf(cf, &key);
                purged += 1;
            }
        }
        self.db.write(batch).context("Failed to purge locks")?;
        Ok(purged)
    }
}
