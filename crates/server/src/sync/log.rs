// crates/server/src/sync/log.rs
//! Append-only replication log.
//!
//! Operations are only ever appended. Each append happens under the write
//! lock and is broadcast before the lock is released, so readers and
//! subscribers always observe whole operations in log order.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::Utc;
use jobdeck_core::{
    group_messages, CrdtOperation, MessageGroup, NewCrdtOperation, SyncError, SyncResult,
    Timestamp,
};
use serde::Serialize;
use tokio::sync::broadcast;
use ts_rs::TS;

use super::backfill::BackfillSource;
use crate::metrics::{record_backfill, record_sync_append};

/// Counts reported when a backfill finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct BackfillSummary {
    pub appended: u64,
    pub skipped_duplicates: u64,
    pub skipped_stale: u64,
}

/// Push notification emitted by the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    Appended { operation: CrdtOperation },
    BackfillCompleted { summary: BackfillSummary },
    BackfillFailed { error: String },
}

impl SyncEvent {
    /// SSE event name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Appended { .. } => "appended",
            Self::BackfillCompleted { .. } => "backfillCompleted",
            Self::BackfillFailed { .. } => "backfillFailed",
        }
    }
}

/// A slice of the log plus the cursor to resume from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub operations: Vec<CrdtOperation>,
    pub next_cursor: usize,
}

#[derive(Default)]
struct LogInner {
    operations: Vec<CrdtOperation>,
    /// Latest timestamp per `(model, record_id)`.
    latest: HashMap<(String, String), Timestamp>,
    seen: HashSet<String>,
    clock: Timestamp,
}

impl LogInner {
    fn latest_for(&self, key: &(String, String)) -> Option<Timestamp> {
        self.latest.get(key).copied()
    }

    fn push(&mut self, op: CrdtOperation) -> &CrdtOperation {
        self.latest.insert(op.record_key(), op.timestamp);
        self.seen.insert(op.dedup_key());
        self.clock = self.clock.max(op.timestamp);
        self.operations.push(op);
        &self.operations[self.operations.len() - 1]
    }
}

/// Clears the single-flight flag when dropped, including on panic.
struct BackfillGuard(Arc<AtomicBool>);

impl BackfillGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> SyncResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(Arc::clone(flag)))
            .map_err(|_| SyncError::Conflict("Backfill already in progress".to_string()))
    }
}

impl Drop for BackfillGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncLog {
    inner: RwLock<LogInner>,
    events: broadcast::Sender<SyncEvent>,
    source: Arc<dyn BackfillSource>,
    backfilling: Arc<AtomicBool>,
}

impl SyncLog {
    pub fn new(source: Arc<dyn BackfillSource>, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: RwLock::new(LogInner::default()),
            events,
            source,
            backfilling: Arc::new(AtomicBool::new(false)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LogInner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            tracing::error!("sync log lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, LogInner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            tracing::error!("sync log lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.read().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_backfilling(&self) -> bool {
        self.backfilling.load(Ordering::Acquire)
    }

    /// Append one operation at the end of the log.
    ///
    /// Without a timestamp the log assigns one strictly greater than both the
    /// record's latest timestamp and the log clock. An explicit timestamp
    /// that does not move the record forward is rejected and nothing is
    /// appended.
    pub fn append(&self, op: NewCrdtOperation) -> SyncResult<CrdtOperation> {
        if op.model.trim().is_empty() {
            return Err(SyncError::Invalid("model must not be empty".to_string()));
        }

        let mut inner = self.write();
        let key = (op.model.clone(), op.record_id.to_string());
        let latest = inner.latest_for(&key);

        let timestamp = match op.timestamp {
            Some(ts) => {
                if let Some(latest) = latest.filter(|latest| ts <= *latest) {
                    return Err(SyncError::Invalid(format!(
                        "timestamp {ts} for {} {} is not after {latest}",
                        key.0, key.1
                    )));
                }
                ts
            }
            None => {
                let floor = inner.clock.max(latest.unwrap_or(0));
                let next = floor.checked_add(1).ok_or_else(|| {
                    SyncError::Invalid(format!(
                        "no timestamp left after {floor} for {} {}",
                        key.0, key.1
                    ))
                })?;
                wall_clock_micros().max(next)
            }
        };

        let appended = inner
            .push(CrdtOperation {
                model: op.model,
                record_id: op.record_id,
                data: op.data,
                timestamp,
            })
            .clone();
        record_sync_append();
        tracing::debug!(model = %appended.model, record_id = %appended.record_id, timestamp, "operation appended");
        let _ = self.events.send(SyncEvent::Appended {
            operation: appended.clone(),
        });
        Ok(appended)
    }

    /// Operations from log position `since` (default 0) to the end.
    pub fn query(&self, since: Option<usize>) -> Vec<CrdtOperation> {
        self.page(since).operations
    }

    pub fn page(&self, since: Option<usize>) -> LogPage {
        let inner = self.read();
        let start = since.unwrap_or(0).min(inner.operations.len());
        LogPage {
            operations: inner.operations[start..].to_vec(),
            next_cursor: inner.operations.len(),
        }
    }

    /// The whole log as contiguous per-record runs.
    pub fn grouped(&self) -> Vec<MessageGroup> {
        group_messages(&self.read().operations)
    }

    /// Replay the backfill source into the log and wait for it to finish.
    ///
    /// Fails with `Conflict` when another backfill is running.
    pub async fn backfill(&self) -> SyncResult<BackfillSummary> {
        let guard = BackfillGuard::acquire(&self.backfilling)?;
        self.run_backfill(guard).await
    }

    /// Start a backfill in the background. The outcome is delivered to
    /// subscribers as a `BackfillCompleted` or `BackfillFailed` event.
    pub fn start_backfill(self: &Arc<Self>) -> SyncResult<()> {
        let guard = BackfillGuard::acquire(&self.backfilling)?;
        let log = Arc::clone(self);
        tokio::spawn(async move {
            let _ = log.run_backfill(guard).await;
        });
        Ok(())
    }

    async fn run_backfill(&self, guard: BackfillGuard) -> SyncResult<BackfillSummary> {
        let started = Instant::now();
        tracing::info!(source = %self.source.describe(), "backfill started");

        let result = self.replay().await;
        // Released before notifying so a subscriber may start the next one.
        drop(guard);
        match &result {
            Ok(summary) => {
                record_backfill(started.elapsed(), Some(summary.appended));
                tracing::info!(
                    appended = summary.appended,
                    skipped_duplicates = summary.skipped_duplicates,
                    skipped_stale = summary.skipped_stale,
                    duration_secs = started.elapsed().as_secs_f64(),
                    "backfill complete"
                );
                let _ = self.events.send(SyncEvent::BackfillCompleted {
                    summary: summary.clone(),
                });
            }
            Err(e) => {
                record_backfill(started.elapsed(), None);
                tracing::warn!(error = %e, "backfill failed");
                let _ = self.events.send(SyncEvent::BackfillFailed {
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn replay(&self) -> SyncResult<BackfillSummary> {
        let mut operations = self.source.load().await?;
        // Stable, so equal timestamps keep their source order.
        operations.sort_by_key(|op| op.timestamp);

        let mut summary = BackfillSummary::default();
        for op in operations {
            let mut inner = self.write();
            if inner.seen.contains(&op.dedup_key()) {
                summary.skipped_duplicates += 1;
                continue;
            }
            if inner
                .latest_for(&op.record_key())
                .is_some_and(|latest| op.timestamp <= latest)
            {
                summary.skipped_stale += 1;
                continue;
            }

            let appended = inner.push(op).clone();
            record_sync_append();
            let _ = self.events.send(SyncEvent::Appended {
                operation: appended,
            });
            summary.appended += 1;
        }
        Ok(summary)
    }
}

fn wall_clock_micros() -> Timestamp {
    u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0)
}
