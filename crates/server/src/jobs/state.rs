// crates/server/src/jobs/state.rs
//! Shared state for a single job.
//!
//! Status, counters and timestamps live behind one mutex so a control command
//! and a progress update for the same job are applied one after the other,
//! never interleaved. Every change bumps the store revision and is broadcast
//! while the lock is held, which keeps per-job event order FIFO.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use jobdeck_core::{JobAction, JobError, JobId, JobProgressEvent, JobReport, JobStatus};
use tokio::sync::{broadcast, watch};

use super::types::JobEvent;
use crate::metrics::record_job_transition;

/// What the runner should do after recording a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// More tasks remain.
    Continue,
    /// The job reached a terminal status.
    Finished(JobStatus),
}

pub struct JobState {
    id: JobId,
    group_id: JobId,
    report: Mutex<JobReport>,
    status_tx: watch::Sender<JobStatus>,
    events: broadcast::Sender<JobEvent>,
    revision: Arc<AtomicU64>,
}

impl JobState {
    pub fn new(
        report: JobReport,
        events: broadcast::Sender<JobEvent>,
        revision: Arc<AtomicU64>,
    ) -> Self {
        let (status_tx, _) = watch::channel(report.status);
        Self {
            id: report.id,
            group_id: report.group_id,
            report: Mutex::new(report),
            status_tx,
            events,
            revision,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn group_id(&self) -> JobId {
        self.group_id
    }

    fn lock(&self) -> MutexGuard<'_, JobReport> {
        self.report.lock().unwrap_or_else(|poisoned| {
            tracing::error!(job_id = %self.id, "job state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn snapshot(&self) -> JobReport {
        self.lock().clone()
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    /// Apply a user command, enforcing the state machine guards.
    pub fn apply(&self, action: JobAction) -> Result<JobStatus, JobError> {
        let mut report = self.lock();
        let next = report.status.apply(action)?;
        self.transition(&mut report, next);
        Ok(next)
    }

    /// Record the executor's task count. A job with nothing to do completes
    /// immediately.
    pub fn set_total(&self, total: u64) -> TaskOutcome {
        let mut report = self.lock();
        report.task_count = total;
        if report.status.is_terminal() {
            return TaskOutcome::Finished(report.status);
        }
        if report.completed_task_count >= total {
            self.transition(&mut report, JobStatus::Completed);
            return TaskOutcome::Finished(JobStatus::Completed);
        }
        self.touch();
        TaskOutcome::Continue
    }

    /// Whether the executor has already reported a task count.
    pub fn is_prepared(&self) -> bool {
        self.lock().task_count > 0
    }

    pub fn completed_tasks(&self) -> u64 {
        self.lock().completed_task_count
    }

    /// Count one finished task and emit a progress event.
    ///
    /// A task that finishes after the job was canceled is discarded. A task
    /// that finishes while a pause is pending still counts, and if it was the
    /// last one the job completes: completion takes precedence over pause.
    pub fn record_task(&self, message: String) -> TaskOutcome {
        let mut report = self.lock();
        if report.status.is_terminal() {
            return TaskOutcome::Finished(report.status);
        }

        report.completed_task_count = (report.completed_task_count + 1).min(report.task_count);
        report.message = Some(message.clone());
        self.touch();
        let _ = self.events.send(JobEvent::Progress(JobProgressEvent {
            job_id: self.id,
            message,
            completed_tasks: report.completed_task_count,
            total_tasks: report.task_count,
        }));

        if report.completed_task_count >= report.task_count {
            self.transition(&mut report, JobStatus::Completed);
            TaskOutcome::Finished(JobStatus::Completed)
        } else {
            TaskOutcome::Continue
        }
    }

    /// Move to Failed and keep the diagnostic. No effect on a terminal job.
    pub fn fail(&self, error: impl Into<String>) -> JobStatus {
        let mut report = self.lock();
        if report.status.is_terminal() {
            return report.status;
        }
        let error = error.into();
        tracing::warn!(job_id = %self.id, group_id = %self.group_id, error = %error, "job failed");
        report.errors_text.push(error);
        self.transition(&mut report, JobStatus::Failed);
        JobStatus::Failed
    }

    /// Wait until the job may execute its next task.
    ///
    /// Returns `true` once Running, `false` when the job became terminal.
    /// Paused and Queued jobs block here until a command moves them on.
    pub async fn wait_until_runnable(&self) -> bool {
        let mut rx = self.status_tx.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            match status {
                JobStatus::Running => return true,
                JobStatus::Completed | JobStatus::Canceled | JobStatus::Failed => return false,
                JobStatus::Queued | JobStatus::Paused => {
                    if rx.changed().await.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    fn transition(&self, report: &mut JobReport, next: JobStatus) {
        let now = Utc::now();
        match next {
            JobStatus::Running if report.started_at.is_none() => report.started_at = Some(now),
            JobStatus::Completed | JobStatus::Canceled | JobStatus::Failed => {
                report.completed_at = Some(now)
            }
            _ => {}
        }
        report.status = next;
        self.touch();
        self.status_tx.send_replace(next);
        record_job_transition(next);
        tracing::debug!(job_id = %self.id, group_id = %self.group_id, status = %next, "job status changed");
        let _ = self.events.send(JobEvent::StatusChanged {
            job_id: self.id,
            group_id: self.group_id,
            status: next,
        });
    }

    fn touch(&self) {
        self.revision.fetch_add(1, Ordering::Relaxed);
    }
}
