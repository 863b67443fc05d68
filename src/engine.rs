//! Per-chain sync engine
//!
//! Runs one catch-up cycle for one chain: compute the safe scan target,
//! detect and roll back reorged history, then scan forward in bounded
//! batches, persisting events idempotently and checkpointing after every
//! batch. A crash mid-cycle therefore costs at most one batch of re-work,
//! and re-scanning a range never duplicates events.

use crate::config::ChainSettings;
use crate::normalize::normalize_events;
use crate::records::SyncStateRecord;
use crate::retry::with_retry;
use crate::rpc::ChainReader;
use crate::store::FeeStore;
use crate::types::BlockHeader;
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Summary of one completed (or cancelled) cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Batches fully scanned and checkpointed
    pub batches: u64,
    /// Events newly inserted this cycle
    pub events_inserted: u64,
    /// Events skipped because their key already existed (range replay)
    pub events_replayed: u64,
    /// Rollback target if a reorg was detected this cycle
    pub rolled_back_to: Option<u64>,
    /// Checkpoint after the cycle; `None` if nothing has ever been scanned
    pub last_processed_block: Option<u64>,
    /// Whether the cycle stopped early on the cancellation signal
    pub cancelled: bool,
}

/// Sync engine for a single chain.
///
/// The engine only runs on behalf of the worker currently holding the
/// chain's lock; it performs no locking itself.
pub struct SyncEngine<'a> {
    store: &'a dyn FeeStore,
    chain: &'a dyn ChainReader,
    settings: &'a ChainSettings,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        store: &'a dyn FeeStore,
        chain: &'a dyn ChainReader,
        settings: &'a ChainSettings,
    ) -> Self {
        Self {
            store,
            chain,
            settings,
        }
    }

    /// Fetch a block header with retries, treating a missing block as a
    /// fatal misconfiguration: a block at or below the safe height must
    /// exist on the chain this endpoint claims to serve.
    async fn must_get_block(&self, number: u64) -> Result<BlockHeader> {
        let header = with_retry(
            &format!("{}: get block {}", self.settings.name, number),
            self.settings.rpc_max_attempts,
            self.settings.rpc_retry_delay(),
            || self.chain.block_by_number(number),
        )
        .await?;
        header.with_context(|| {
            format!(
                "block {} not found on chain {}; RPC endpoint likely points at the wrong network",
                number, self.settings.chain_id
            )
        })
    }

    /// Check the stored checkpoint hash against the chain and roll back if
    /// history was rewritten. Returns the cursor to continue from.
    async fn check_reorg(
        &self,
        state: &SyncStateRecord,
        report: &mut CycleReport,
    ) -> Result<Option<u64>> {
        let stored_hash = match state.last_processed_block_hash {
            Some(hash) => hash,
            // No hash to compare: deliberately set after a rollback.
            None => return Ok(Some(state.last_processed_block)),
        };

        let header = self.must_get_block(state.last_processed_block).await?;
        if header.hash == stored_hash {
            return Ok(Some(state.last_processed_block));
        }

        // Confirmed reorg: the block we checkpointed has been replaced.
        let chain_id = self.settings.chain_id;
        let rollback_floor = self.settings.start_block.saturating_sub(1);
        let rollback_to = rollback_floor.max(
            state
                .last_processed_block
                .saturating_sub(self.settings.reorg_backtrack),
        );
        warn!(
            chain = chain_id,
            checkpoint = state.last_processed_block,
            stored = %stored_hash,
            observed = %header.hash,
            rollback_to,
            "reorg detected, rolling back"
        );

        let deleted = self
            .store
            .delete_events_above(chain_id, rollback_to)
            .context("Failed to delete reorged events")?;
        info!(
            chain = chain_id,
            deleted, rollback_to, "deleted events above rollback target"
        );

        report.rolled_back_to = Some(rollback_to);
        if rollback_to < self.settings.start_block {
            // Nothing valid left to checkpoint.
            self.store
                .delete_sync_state(chain_id)
                .context("Failed to delete sync state during rollback")?;
            Ok(None)
        } else {
            // The empty hash suppresses reorg detection on the next read;
            // there is nothing meaningful to compare yet.
            self.store
                .put_sync_state(
                    chain_id,
                    &SyncStateRecord {
                        last_processed_block: rollback_to,
                        last_processed_block_hash: None,
                    },
                )
                .context("Failed to checkpoint rollback")?;
            Ok(Some(rollback_to))
        }
    }

    /// Fetch, normalize, and persist the events of one block range.
    async fn process_range(&self, from: u64, to: u64, report: &mut CycleReport) -> Result<()> {
        let chain_id = self.settings.chain_id;
        let events = with_retry(
            &format!("{}: get logs [{}, {}]", self.settings.name, from, to),
            self.settings.rpc_max_attempts,
            self.settings.rpc_retry_delay(),
            || self.chain.logs_in_range(from, to),
        )
        .await?;
        if events.is_empty() {
            debug!(chain = chain_id, from, to, "no events in range");
            return Ok(());
        }

        // One timestamp lookup per distinct block, not per event.
        let blocks: BTreeSet<u64> = events.iter().map(|e| e.block_number).collect();
        let mut timestamps = HashMap::with_capacity(blocks.len());
        for number in blocks {
            let header = self.must_get_block(number).await?;
            timestamps.insert(number, header.timestamp);
        }

        let normalized = normalize_events(&events, chain_id, &timestamps)?;

        // Writes are applied independently: one failed insert must not
        // keep the rest of the batch from landing.
        let mut first_error = None;
        for event in &normalized {
            match self.store.insert_event(event) {
                Ok(true) => report.events_inserted += 1,
                Ok(false) => report.events_replayed += 1,
                Err(err) => {
                    warn!(
                        chain = chain_id,
                        tx = %event.tx_hash,
                        log_index = event.log_index,
                        "failed to persist event: {err:#}"
                    );
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err.context("Failed to persist event batch")),
            None => {
                info!(
                    chain = chain_id,
                    from,
                    to,
                    events = normalized.len(),
                    "persisted event batch"
                );
                Ok(())
            }
        }
    }

    /// Run one full catch-up cycle.
    ///
    /// Returns cleanly when caught up to the safe block or when
    /// cancellation is observed between batches; cancellation is not a
    /// failure. RPC and persistence errors propagate to the caller, which
    /// owns per-chain failure isolation.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let chain_id = self.settings.chain_id;
        let mut report = CycleReport::default();

        // Fixed once per cycle so the scan target cannot drift while we
        // work; a later-arriving block is picked up next cycle.
        let latest = with_retry(
            &format!("{}: latest block number", self.settings.name),
            self.settings.rpc_max_attempts,
            self.settings.rpc_retry_delay(),
            || self.chain.latest_block_number(),
        )
        .await?;
        let safe_block = latest.saturating_sub(self.settings.confirmations);

        // `None` means nothing processed yet: the first batch starts at
        // the configured start block.
        let mut cursor = match self.store.get_sync_state(chain_id)? {
            Some(state) => self.check_reorg(&state, &mut report).await?,
            None => None,
        };
        report.last_processed_block = cursor;

        debug!(
            chain = chain_id,
            latest,
            safe_block,
            cursor = ?cursor,
            "starting batch loop"
        );

        loop {
            if cancel.is_cancelled() {
                info!(chain = chain_id, "cancellation requested, stopping cycle");
                report.cancelled = true;
                return Ok(report);
            }

            let from = match cursor {
                Some(last) => match last.checked_add(1) {
                    Some(next) => next,
                    None => break,
                },
                None => self.settings.start_block,
            };
            if from > safe_block {
                break;
            }
            let to = safe_block.min(from + self.settings.batch_size - 1);

            self.process_range(from, to, &mut report).await?;

            // Checkpoint whether or not events were found: the range
            // itself has been fully scanned.
            let header = self.must_get_block(to).await?;
            self.store
                .put_sync_state(
                    chain_id,
                    &SyncStateRecord {
                        last_processed_block: to,
                        last_processed_block_hash: Some(header.hash),
                    },
                )
                .context("Failed to checkpoint batch")?;
            cursor = Some(to);
            report.last_processed_block = cursor;
            report.batches += 1;

            if to >= safe_block {
                break;
            }
            // Inter-batch throttle, returning promptly on cancellation.
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(chain = chain_id, "cancellation requested, stopping cycle");
                    report.cancelled = true;
                    return Ok(report);
                }
                _ = tokio::time::sleep(self.settings.batch_delay()) => {}
            }
        }

        info!(
            chain = chain_id,
            batches = report.batches,
            inserted = report.events_inserted,
            last_processed = ?report.last_processed_block,
            "cycle complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawFeeEvent;
    use crate::store::RocksFeeStore;
    use alloy_primitives::{address, B256, U256};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Deterministic per-block hash for test chains.
    fn hash_for(block: u64, fork: u8) -> B256 {
        let mut bytes = [0u8; 32];
        bytes[0] = fork;
        bytes[24..32].copy_from_slice(&block.to_be_bytes());
        B256::from(bytes)
    }

    fn tx(n: u8) -> B256 {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        B256::from(bytes)
    }

    /// Scripted chain: every block below `latest` exists with hash
    /// `hash_for(n, fork)` unless overridden; events are served from a
    /// fixed list. Log queries are recorded for assertions.
    struct MockChain {
        latest: u64,
        fork: u8,
        missing_blocks: Vec<u64>,
        events: Vec<RawFeeEvent>,
        log_calls: Mutex<Vec<(u64, u64)>>,
        block_calls: Mutex<Vec<u64>>,
    }

    impl MockChain {
        fn new(latest: u64) -> Self {
            Self {
                latest,
                fork: 0,
                missing_blocks: Vec::new(),
                events: Vec::new(),
                log_calls: Mutex::new(Vec::new()),
                block_calls: Mutex::new(Vec::new()),
            }
        }

        fn event(&mut self, block: u64, tx_n: u8, log_index: u64) {
            self.events.push(RawFeeEvent {
                block_number: block,
                block_hash: hash_for(block, self.fork),
                tx_hash: tx(tx_n),
                log_index,
                token: address!("dac17f958d2ee523a2206206994597c13d831ec7"),
                integrator: address!("0742d35cc6634c0532925a3b844bc9e7595f0beb"),
                integrator_fee: U256::from(1500u64),
                lifi_fee: U256::from(500u64),
            });
        }

        fn log_ranges(&self) -> Vec<(u64, u64)> {
            self.log_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChainReader for MockChain {
        async fn latest_block_number(&self) -> Result<u64> {
            Ok(self.latest)
        }

        async fn block_by_number(&self, number: u64) -> Result<Option<BlockHeader>> {
            self.block_calls.lock().unwrap().push(number);
            if number > self.latest || self.missing_blocks.contains(&number) {
                return Ok(None);
            }
            Ok(Some(BlockHeader {
                number,
                hash: hash_for(number, self.fork),
                timestamp: 1_700_000_000 + number * 12,
            }))
        }

        async fn logs_in_range(&self, from: u64, to: u64) -> Result<Vec<RawFeeEvent>> {
            self.log_calls.lock().unwrap().push((from, to));
            Ok(self
                .events
                .iter()
                .filter(|e| e.block_number >= from && e.block_number <= to)
                .cloned()
                .collect())
        }
    }

    fn settings(chain_id: u64, start_block: u64, confirmations: u64, batch_size: u64) -> ChainSettings {
        ChainSettings {
            chain_id,
            name: format!("test-{}", chain_id),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: address!("bd6c7b0d2f68c2b7805d88388319cfb6ecb50ea9"),
            start_block,
            confirmations,
            reorg_backtrack: 10,
            batch_size,
            batch_delay_ms: 0,
            rpc_max_attempts: 3,
            rpc_retry_delay_ms: 1,
        }
    }

    fn create_test_store() -> (RocksFeeStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksFeeStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_end_to_end_first_cycle() {
        let (store, _temp_dir) = create_test_store();
        let mut chain = MockChain::new(106);
        chain.event(100, 0xcc, 1);
        let cfg = settings(137, 100, 5, 10);
        let engine = SyncEngine::new(&store, &chain, &cfg);

        let report = engine.run_cycle(&CancellationToken::new()).await.unwrap();

        // safe block = 106 - 5 = 101, one batch [100, 101].
        assert_eq!(chain.log_ranges(), vec![(100, 101)]);
        assert_eq!(report.batches, 1);
        assert_eq!(report.events_inserted, 1);
        assert!(!report.cancelled);

        let stored = store.get_event(137, tx(0xcc), 1).unwrap().unwrap();
        assert_eq!(stored.block_number, 100);
        assert_eq!(stored.block_timestamp, 1_700_000_000 + 100 * 12);
        assert_eq!(stored.integrator_fee, "1500");

        let state = store.get_sync_state(137).unwrap().unwrap();
        assert_eq!(state.last_processed_block, 101);
        assert_eq!(state.last_processed_block_hash, Some(hash_for(101, 0)));
    }

    #[tokio::test]
    async fn test_rescan_is_idempotent() {
        let (store, _temp_dir) = create_test_store();
        let mut chain = MockChain::new(106);
        chain.event(100, 0xcc, 1);
        let cfg = settings(137, 100, 5, 10);

        SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();
        // Wipe the checkpoint to force a full re-scan of the same range.
        store.delete_sync_state(137).unwrap();
        let report = SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.events_inserted, 0);
        assert_eq!(report.events_replayed, 1);
        assert_eq!(store.count_events(137).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_partitioning() {
        let (store, _temp_dir) = create_test_store();
        let chain = MockChain::new(110);
        let cfg = settings(137, 100, 0, 5);
        store
            .put_sync_state(
                137,
                &SyncStateRecord {
                    last_processed_block: 99,
                    last_processed_block_hash: Some(hash_for(99, 0)),
                },
            )
            .unwrap();

        let report = SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(chain.log_ranges(), vec![(100, 104), (105, 109), (110, 110)]);
        assert_eq!(report.batches, 3);
        assert_eq!(
            store.get_sync_state(137).unwrap().unwrap().last_processed_block,
            110
        );
    }

    #[tokio::test]
    async fn test_noop_cycle_when_caught_up() {
        let (store, _temp_dir) = create_test_store();
        let chain = MockChain::new(110);
        // safe block = 105 <= last processed 105: nothing to scan.
        let cfg = settings(137, 100, 5, 10);
        let state = SyncStateRecord {
            last_processed_block: 105,
            last_processed_block_hash: Some(hash_for(105, 0)),
        };
        store.put_sync_state(137, &state).unwrap();

        let report = SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();

        assert!(chain.log_ranges().is_empty());
        assert_eq!(report.batches, 0);
        assert_eq!(store.get_sync_state(137).unwrap().unwrap(), state);
    }

    #[tokio::test]
    async fn test_reorg_rollback() {
        let (store, _temp_dir) = create_test_store();
        // Checkpoint carries a hash from fork 1; the chain now serves
        // fork 0: hashes differ at block 150, reorg confirmed.
        let mut chain = MockChain::new(145 + 5);
        chain.fork = 0;
        let cfg = settings(137, 100, 5, 50);
        store
            .put_sync_state(
                137,
                &SyncStateRecord {
                    last_processed_block: 150,
                    last_processed_block_hash: Some(hash_for(150, 1)),
                },
            )
            .unwrap();
        // Events on both sides of the rollback target.
        for (block, tx_n) in [(139, 1u8), (140, 2), (141, 3), (150, 4)] {
            store
                .insert_event(&crate::normalize::NormalizedEvent {
                    chain_id: 137,
                    tx_hash: tx(tx_n),
                    log_index: 0,
                    block_number: block,
                    block_hash: hash_for(block, 1),
                    token: address!("dac17f958d2ee523a2206206994597c13d831ec7"),
                    integrator: address!("0742d35cc6634c0532925a3b844bc9e7595f0beb"),
                    integrator_fee: "1".to_string(),
                    lifi_fee: "1".to_string(),
                    block_timestamp: 0,
                })
                .unwrap();
        }

        let report = SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();

        // rollback target = max(99, 150 - 10) = 140.
        assert_eq!(report.rolled_back_to, Some(140));
        // Events above 140 are gone, the rest survive.
        assert!(store.get_event(137, tx(1), 0).unwrap().is_some());
        assert!(store.get_event(137, tx(2), 0).unwrap().is_some());
        assert!(store.get_event(137, tx(3), 0).unwrap().is_none());
        assert!(store.get_event(137, tx(4), 0).unwrap().is_none());
        // The next scanned batch starts at 141.
        assert_eq!(chain.log_ranges(), vec![(141, 145)]);
        // Checkpoint advanced to the new safe block with a live hash.
        let state = store.get_sync_state(137).unwrap().unwrap();
        assert_eq!(state.last_processed_block, 145);
        assert_eq!(state.last_processed_block_hash, Some(hash_for(145, 0)));
    }

    #[tokio::test]
    async fn test_rollback_hash_suppresses_redetection() {
        let (store, _temp_dir) = create_test_store();
        // Same reorg as above, but the chain tip leaves nothing new to
        // scan; the checkpoint must stay at the rollback target with no
        // hash, so the next cycle skips reorg detection.
        let mut chain = MockChain::new(140);
        chain.fork = 0;
        let cfg = settings(137, 100, 5, 50);
        store
            .put_sync_state(
                137,
                &SyncStateRecord {
                    last_processed_block: 150,
                    last_processed_block_hash: Some(hash_for(150, 1)),
                },
            )
            .unwrap();

        SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();

        let state = store.get_sync_state(137).unwrap().unwrap();
        assert_eq!(state.last_processed_block, 140);
        assert_eq!(state.last_processed_block_hash, None);

        // Second cycle: no reorg check fetch for block 140, straight to
        // scanning.
        chain.block_calls.lock().unwrap().clear();
        SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();
        assert!(!chain.block_calls.lock().unwrap().contains(&140));
    }

    #[tokio::test]
    async fn test_rollback_past_start_block_deletes_state() {
        let (store, _temp_dir) = create_test_store();
        let mut chain = MockChain::new(106);
        chain.fork = 0;
        chain.event(100, 0xcc, 1);
        let cfg = settings(137, 100, 5, 50);
        // last 104, backtrack 10 => raw target 94 < start 100: the state
        // row is deleted and the scan restarts at the start block.
        store
            .put_sync_state(
                137,
                &SyncStateRecord {
                    last_processed_block: 104,
                    last_processed_block_hash: Some(hash_for(104, 1)),
                },
            )
            .unwrap();

        let report = SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.rolled_back_to, Some(99));
        assert_eq!(chain.log_ranges(), vec![(100, 101)]);
        assert_eq!(report.events_inserted, 1);
        assert_eq!(
            store.get_sync_state(137).unwrap().unwrap().last_processed_block,
            101
        );
    }

    #[tokio::test]
    async fn test_checkpoint_block_missing_is_fatal() {
        let (store, _temp_dir) = create_test_store();
        let mut chain = MockChain::new(110);
        chain.missing_blocks.push(105);
        let cfg = settings(137, 100, 5, 10);

        let err = SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("block 105 not found"));
        // Nothing was checkpointed for the failed batch.
        assert!(store.get_sync_state(137).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reorg_check_block_missing_is_fatal() {
        let (store, _temp_dir) = create_test_store();
        let mut chain = MockChain::new(200);
        chain.missing_blocks.push(150);
        let cfg = settings(137, 100, 5, 10);
        store
            .put_sync_state(
                137,
                &SyncStateRecord {
                    last_processed_block: 150,
                    last_processed_block_hash: Some(hash_for(150, 0)),
                },
            )
            .unwrap();

        let err = SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("block 150 not found"));
        // No silent rollback happened.
        let state = store.get_sync_state(137).unwrap().unwrap();
        assert_eq!(state.last_processed_block, 150);
    }

    #[tokio::test]
    async fn test_cancellation_before_first_batch() {
        let (store, _temp_dir) = create_test_store();
        let chain = MockChain::new(200);
        let cfg = settings(137, 100, 5, 10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.batches, 0);
        assert!(chain.log_ranges().is_empty());
        assert!(store.get_sync_state(137).unwrap().is_none());
    }

    /// Store wrapper that fails checkpoint writes a fixed number of times,
    /// simulating a crash between event persistence and checkpointing.
    struct FlakyCheckpointStore<'a> {
        inner: &'a RocksFeeStore,
        failures_left: Mutex<u32>,
    }

    impl FeeStore for FlakyCheckpointStore<'_> {
        fn get_sync_state(&self, chain_id: u64) -> Result<Option<SyncStateRecord>> {
            self.inner.get_sync_state(chain_id)
        }
        fn put_sync_state(&self, chain_id: u64, state: &SyncStateRecord) -> Result<()> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                anyhow::bail!("injected checkpoint failure")
            }
            self.inner.put_sync_state(chain_id, state)
        }
        fn delete_sync_state(&self, chain_id: u64) -> Result<()> {
            self.inner.delete_sync_state(chain_id)
        }
        fn list_sync_states(&self) -> Result<Vec<(u64, SyncStateRecord)>> {
            self.inner.list_sync_states()
        }
        fn insert_event(&self, event: &crate::normalize::NormalizedEvent) -> Result<bool> {
            self.inner.insert_event(event)
        }
        fn get_event(
            &self,
            chain_id: u64,
            tx_hash: B256,
            log_index: u64,
        ) -> Result<Option<crate::records::EventRecord>> {
            self.inner.get_event(chain_id, tx_hash, log_index)
        }
        fn delete_events_above(&self, chain_id: u64, block: u64) -> Result<u64> {
            self.inner.delete_events_above(chain_id, block)
        }
        fn count_events(&self, chain_id: u64) -> Result<u64> {
            self.inner.count_events(chain_id)
        }
        fn events_by_integrator(
            &self,
            integrator: alloy_primitives::Address,
            chain_id: Option<u64>,
            after: Option<crate::store::EventPosition>,
            limit: usize,
        ) -> Result<Vec<crate::records::EventRecord>> {
            self.inner.events_by_integrator(integrator, chain_id, after, limit)
        }
        fn acquire_lock(&self, c: u64, o: &str, n: u64, t: u64) -> Result<bool> {
            self.inner.acquire_lock(c, o, n, t)
        }
        fn renew_lock(&self, c: u64, o: &str, n: u64, t: u64) -> Result<bool> {
            self.inner.renew_lock(c, o, n, t)
        }
        fn release_lock(&self, c: u64, o: &str) -> Result<()> {
            self.inner.release_lock(c, o)
        }
        fn get_lock(&self, c: u64) -> Result<Option<crate::records::LockRecord>> {
            self.inner.get_lock(c)
        }
        fn list_locks(&self) -> Result<Vec<(u64, crate::records::LockRecord)>> {
            self.inner.list_locks()
        }
        fn purge_expired_locks(&self, n: u64) -> Result<u64> {
            self.inner.purge_expired_locks(n)
        }
    }

    #[tokio::test]
    async fn test_crash_between_persist_and_checkpoint() {
        let (store, _temp_dir) = create_test_store();
        let mut chain = MockChain::new(106);
        chain.event(100, 0xcc, 1);
        let cfg = settings(137, 100, 5, 10);

        // First attempt persists the events but dies on the checkpoint.
        let flaky = FlakyCheckpointStore {
            inner: &store,
            failures_left: Mutex::new(1),
        };
        let err = SyncEngine::new(&flaky, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("checkpoint"));
        assert_eq!(store.count_events(137).unwrap(), 1);
        assert!(store.get_sync_state(137).unwrap().is_none());

        // Restart re-scans the same batch: no duplicates, checkpoint lands.
        let report = SyncEngine::new(&store, &chain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.events_inserted, 0);
        assert_eq!(report.events_replayed, 1);
        assert_eq!(store.count_events(137).unwrap(), 1);
        assert_eq!(
            store.get_sync_state(137).unwrap().unwrap().last_processed_block,
            101
        );
    }

    #[tokio::test]
    async fn test_rpc_error_propagates_after_retries() {
        struct FailingChain;

        #[async_trait]
        impl ChainReader for FailingChain {
            async fn latest_block_number(&self) -> Result<u64> {
                anyhow::bail!("connection refused")
            }
            async fn block_by_number(&self, _number: u64) -> Result<Option<BlockHeader>> {
                anyhow::bail!("connection refused")
            }
            async fn logs_in_range(&self, _from: u64, _to: u64) -> Result<Vec<RawFeeEvent>> {
                anyhow::bail!("connection refused")
            }
        }

        let (store, _temp_dir) = create_test_store();
        let cfg = settings(137, 100, 5, 10);
        let err = SyncEngine::new(&store, &FailingChain, &cfg)
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }
}
