//! Multi-chain sync worker
//!
//! Drives the sync engine for every configured chain: one concurrent task
//! per chain per round, each guarded by the chain's lock lease. A chain
//! whose lock is held elsewhere is skipped for the round; a chain whose
//! cycle fails is reported without disturbing the others. Rounds repeat
//! on a fixed interval until the cancellation signal fires.

use crate::config::ChainSettings;
use crate::engine::{CycleReport, SyncEngine};
use crate::rpc::ChainReader;
use crate::store::FeeStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What happened to one chain during one round.
#[derive(Debug)]
pub enum ChainOutcome {
    /// Cycle ran to completion (possibly cancelled cleanly mid-way)
    Completed(CycleReport),
    /// Another live worker holds the chain's lock; retried next round
    Skipped,
    /// Cycle failed; the stored checkpoint still marks the last good batch
    Failed(String),
}

/// Per-chain result row of a round.
#[derive(Debug)]
pub struct RoundEntry {
    pub chain_id: u64,
    pub name: String,
    pub outcome: ChainOutcome,
}

/// Worker owning a set of chains and the store they sync into.
pub struct SyncWorker {
    store: Arc<dyn FeeStore>,
    chains: Vec<(ChainSettings, Arc<dyn ChainReader>)>,
    owner_id: String,
    lock_ttl: Duration,
    round_interval: Duration,
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl SyncWorker {
    pub fn new(
        store: Arc<dyn FeeStore>,
        chains: Vec<(ChainSettings, Arc<dyn ChainReader>)>,
        owner_id: String,
        lock_ttl: Duration,
        round_interval: Duration,
    ) -> Self {
        Self {
            store,
            chains,
            owner_id,
            lock_ttl,
            round_interval,
        }
    }

    /// Run one cycle for one chain under its lock lease.
    async fn run_chain(
        store: Arc<dyn FeeStore>,
        settings: ChainSettings,
        chain: Arc<dyn ChainReader>,
        owner_id: String,
        lock_ttl: Duration,
        cancel: CancellationToken,
    ) -> ChainOutcome {
        let chain_id = settings.chain_id;
        let granted = match store.acquire_lock(
            chain_id,
            &owner_id,
            unix_now_ms(),
            lock_ttl.as_millis() as u64,
        ) {
            Ok(granted) => granted,
            Err(err) => return ChainOutcome::Failed(format!("lock acquire failed: {err:#}")),
        };
        if !granted {
            info!(chain = chain_id, "lock held by another worker, skipping round");
            return ChainOutcome::Skipped;
        }

        let engine = SyncEngine::new(store.as_ref(), chain.as_ref(), &settings);
        let outcome = match engine.run_cycle(&cancel).await {
            Ok(report) => ChainOutcome::Completed(report),
            Err(err) => ChainOutcome::Failed(format!("{err:#}")),
        };

        // Release even after a failed cycle; the lease would otherwise
        // block every worker until it expires.
        if let Err(err) = store.release_lock(chain_id, &owner_id) {
            warn!(chain = chain_id, "failed to release lock: {err:#}");
        }
        outcome
    }

    /// Run one round: every chain concurrently, joined into independent
    /// result slots. One chain failing never cancels the others.
    pub async fn run_round(&self, cancel: &CancellationToken) -> Vec<RoundEntry> {
        let mut handles = Vec::with_capacity(self.chains.len());
        for (settings, chain) in &self.chains {
            let handle = tokio::spawn(Self::run_chain(
                Arc::clone(&self.store),
                settings.clone(),
                Arc::clone(chain),
                self.owner_id.clone(),
                self.lock_ttl,
                cancel.clone(),
            ));
            handles.push((settings.chain_id, settings.name.clone(), handle));
        }

        let mut entries = Vec::with_capacity(handles.len());
        for (chain_id, name, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => ChainOutcome::Failed(format!("task panicked: {err}")),
            };
            match &outcome {
                ChainOutcome::Completed(report) => info!(
                    chain = chain_id,
                    batches = report.batches,
                    inserted = report.events_inserted,
                    cancelled = report.cancelled,
                    "chain round complete"
                ),
                ChainOutcome::Skipped => {}
                ChainOutcome::Failed(reason) => {
                    error!(chain = chain_id, "chain round failed: {reason}")
                }
            }
            entries.push(RoundEntry {
                chain_id,
                name,
                outcome,
            });
        }
        entries
    }

    /// Run a single round; errors if any chain failed, so the process can
    /// exit non-zero.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<Vec<RoundEntry>> {
        let entries = self.run_round(cancel).await;
        let failed: Vec<&RoundEntry> = entries
            .iter()
            .filter(|e| matches!(e.outcome, ChainOutcome::Failed(_)))
            .collect();
        if !failed.is_empty() {
            let names: Vec<&str> = failed.iter().map(|e| e.name.as_str()).collect();
            anyhow::bail!(
                "{} of {} chains failed: {}",
                failed.len(),
                entries.len(),
                names.join(", ")
            );
        }
        Ok(entries)
    }

    /// Run rounds until cancelled, sleeping between them. Per-chain
    /// failures are logged and retried next round.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                info!("cancellation requested, stopping worker");
                return Ok(());
            }
            let entries = self.run_round(cancel).await;
            let (mut ok, mut skipped, mut failed) = (0u32, 0u32, 0u32);
            for entry in &entries {
                match entry.outcome {
                    ChainOutcome::Completed(_) => ok += 1,
                    ChainOutcome::Skipped => skipped += 1,
                    ChainOutcome::Failed(_) => failed += 1,
                }
            }
            info!(ok, skipped, failed, "round complete");

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cancellation requested, stopping worker");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.round_interval) => {}
            }
        }
    }
}
