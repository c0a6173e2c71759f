// crates/core/src/lib.rs
//! Data model shared by the job orchestration core and the replication log:
//! job reports and their state machine, group derivation, CRDT operations and
//! message grouping.

pub mod crdt;
pub mod error;
pub mod group;
pub mod job;

pub use crdt::*;
pub use error::*;
pub use group::*;
pub use job::*;
