// crates/server/src/jobs/mod.rs
//! Job orchestration.
//!
//! Provides:
//! - `JobStore` - report registry, grouped listing and group commands
//! - `JobRunner` - per-group drivers executing jobs in order
//! - `JobState` - guarded status and progress for one job
//! - `JobRegistry` - executors keyed by job action

pub mod registry;
pub mod runner;
pub mod state;
pub mod store;
pub mod types;

pub use registry::{JobExecutor, JobRegistry, WaitExecutor};
pub use runner::JobRunner;
pub use state::JobState;
pub use store::JobStore;
pub use types::{
    ClearedJob, EnqueueGroup, EnqueueJob, GroupActionOutcome, GroupCommand, JobEvent, Notice,
    NoticeKind,
};
