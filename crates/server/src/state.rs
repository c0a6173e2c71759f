// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::jobs::{JobRegistry, JobRunner, JobStore};
use crate::sync::{BackfillSource, JsonFileSource, MemorySource, SyncLog};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: Config,
    /// Job reports, group commands and the runner behind them.
    pub jobs: Arc<JobStore>,
    /// Replication operation log.
    pub sync: Arc<SyncLog>,
}

impl AppState {
    /// State with the built-in executors and the backfill source named by
    /// `config`.
    pub fn new(config: Config) -> Arc<Self> {
        let source: Arc<dyn BackfillSource> = match &config.backfill_file {
            Some(path) => Arc::new(JsonFileSource::new(path)),
            None => Arc::new(MemorySource::default()),
        };
        Self::with_parts(config, Arc::new(JobRegistry::with_builtin()), source)
    }

    pub fn with_parts(
        config: Config,
        registry: Arc<JobRegistry>,
        source: Arc<dyn BackfillSource>,
    ) -> Arc<Self> {
        let runner = Arc::new(JobRunner::new(registry));
        let jobs = Arc::new(JobStore::new(runner, config.event_capacity, config.auto_start));
        let sync = Arc::new(SyncLog::new(source, config.event_capacity));
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            jobs,
            sync,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
