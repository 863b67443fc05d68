//! feesync - incremental FeesCollected event indexer
//!
//! This library incrementally indexes `FeesCollected` log events from an
//! EVM fee collector contract into a durable local store, tolerating
//! chain reorganizations, RPC failures, and process restarts. Each event
//! is stored at most once and sync progress is checkpointed per batch.

pub mod config;
pub mod event;
pub mod keys;
pub mod normalize;
pub mod records;
pub mod retry;
pub mod rpc;
pub mod store;
pub mod types;

// Sync pipeline
pub mod cli;
pub mod engine;
pub mod query;
pub mod worker;

// Re-export the main types for convenience
pub use engine::{CycleReport, SyncEngine};
pub use records::{EventRecord, LockRecord, SyncStateRecord};
pub use store::{FeeStore, RocksFeeStore};
