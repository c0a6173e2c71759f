// crates/server/src/sync/mod.rs
//! Replication log and its backfill sources.

pub mod backfill;
pub mod log;

pub use backfill::{BackfillSource, JsonFileSource, MemorySource};
pub use log::{BackfillSummary, LogPage, SyncEvent, SyncLog};
