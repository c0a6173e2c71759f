// crates/core/src/job.rs
//! Job reports and the job status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::JobError;

/// Unique identifier for a job. Group ids share the same space: a group is
/// identified by the id of its representative (first) job.
pub type JobId = Uuid;

/// Status of a job.
///
/// ```text
/// Queued ──► Running ──► Completed | Failed | Canceled
///   │          ▲  │
///   │          │  ▼
///   │         Paused ──► Canceled
///   └──────────────────► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
pub enum JobStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Canceled,
    Failed,
}

impl JobStatus {
    /// Completed, Failed and Canceled never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Whether a user-issued `action` is permitted from this status.
    pub fn permits(self, action: JobAction) -> bool {
        match action {
            JobAction::Resume => matches!(self, Self::Queued | Self::Paused),
            JobAction::Pause => self == Self::Running,
            JobAction::Cancel => matches!(self, Self::Queued | Self::Running | Self::Paused),
        }
    }

    /// Status reached by applying `action`, or `InvalidState` when the guard
    /// rejects it.
    pub fn apply(self, action: JobAction) -> Result<JobStatus, JobError> {
        if !self.permits(action) {
            return Err(JobError::InvalidState { from: self, action });
        }
        Ok(match action {
            JobAction::Resume => Self::Running,
            JobAction::Pause => Self::Paused,
            JobAction::Cancel => Self::Canceled,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control command issued against a job or a whole group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Resume,
    Pause,
    Cancel,
}

impl JobAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::Pause => "pause",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for JobAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent record of a job, as returned by `jobs.reports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
pub struct JobReport {
    #[ts(type = "string")]
    pub id: JobId,
    pub name: String,
    pub action: String,
    pub status: JobStatus,
    #[ts(type = "string")]
    pub group_id: JobId,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub started_at: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
    pub task_count: u64,
    pub completed_task_count: u64,
    pub message: Option<String>,
    pub errors_text: Vec<String>,
    /// Input parameters handed to the job's executor.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl JobReport {
    /// A fresh Queued report belonging to `group_id`.
    pub fn new(
        id: JobId,
        group_id: JobId,
        name: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            action: action.into(),
            status: JobStatus::Queued,
            group_id,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            task_count: 0,
            completed_task_count: 0,
            message: None,
            errors_text: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Most recent moment this job did something, used to pick the status of
    /// a group with no running member.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.completed_at
            .or(self.started_at)
            .unwrap_or(self.created_at)
    }

    /// Milliseconds spent running, counting up to `now` while unfinished.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        match self.started_at {
            Some(start) => {
                let end = self.completed_at.unwrap_or(now);
                (end - start).num_milliseconds().max(0) as u64
            }
            None => 0,
        }
    }
}

/// Ephemeral progress update streamed while a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
pub struct JobProgressEvent {
    #[ts(type = "string")]
    pub job_id: JobId,
    pub message: String,
    pub completed_tasks: u64,
    pub total_tasks: u64,
}
