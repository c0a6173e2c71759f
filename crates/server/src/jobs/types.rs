// crates/server/src/jobs/types.rs
//! Types for the background job system.

use jobdeck_core::{JobAction, JobError, JobGroup, JobId, JobProgressEvent, JobStatus};
use serde::{Deserialize, Serialize};

/// Push notification emitted by the job system.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobEvent {
    /// A running job finished one more task.
    Progress(JobProgressEvent),
    /// A job moved to a new status.
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        job_id: JobId,
        group_id: JobId,
        status: JobStatus,
    },
    /// A new group was enqueued.
    #[serde(rename_all = "camelCase")]
    Enqueued { group_id: JobId },
    /// A report was removed from the store.
    #[serde(rename_all = "camelCase")]
    Cleared { job_id: JobId, group_id: JobId },
}

impl JobEvent {
    /// SSE event name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::StatusChanged { .. } => "statusChanged",
            Self::Enqueued { .. } => "enqueued",
            Self::Cleared { .. } => "cleared",
        }
    }
}

/// A command applied to every eligible member of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupCommand {
    Resume,
    Pause,
    Cancel,
    Clear,
}

impl GroupCommand {
    fn success_message(self) -> &'static str {
        match self {
            Self::Resume => "Job has been resumed",
            Self::Pause => "Job has been paused",
            Self::Cancel => "Job has been canceled",
            Self::Clear => "Job has been removed",
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            Self::Resume => "Failed to resume job",
            Self::Pause => "Failed to pause job",
            Self::Cancel => "Failed to cancel job",
            Self::Clear => "Failed to remove job",
        }
    }
}

impl From<JobAction> for GroupCommand {
    fn from(action: JobAction) -> Self {
        match action {
            JobAction::Resume => Self::Resume,
            JobAction::Pause => Self::Pause,
            JobAction::Cancel => Self::Cancel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// The one user-facing notification a group command produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// A member of a group that could not be transitioned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub job_id: JobId,
    pub error: String,
}

impl JobFailure {
    pub fn new(job_id: JobId, error: &JobError) -> Self {
        Self {
            job_id,
            error: error.to_string(),
        }
    }
}

/// Result of fanning a command out to the members of a group.
///
/// Each member is attempted independently; failures are listed one by one
/// but collapse into a single [`Notice`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupActionOutcome {
    pub group_id: JobId,
    pub command: GroupCommand,
    pub attempted: Vec<JobId>,
    pub failures: Vec<JobFailure>,
}

impl GroupActionOutcome {
    pub fn new(group_id: JobId, command: GroupCommand) -> Self {
        Self {
            group_id,
            command,
            attempted: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Whether no member qualified for the command.
    pub fn is_noop(&self) -> bool {
        self.attempted.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn notice(&self) -> Notice {
        if self.is_success() {
            Notice {
                kind: NoticeKind::Success,
                message: self.command.success_message().to_string(),
            }
        } else {
            Notice {
                kind: NoticeKind::Error,
                message: format!(
                    "{} ({} of {} jobs)",
                    self.command.failure_message(),
                    self.failures.len(),
                    self.attempted.len()
                ),
            }
        }
    }
}

/// One job in an enqueue request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueJob {
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Jobs enqueued together form one group, executed in the given order.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueGroup {
    pub jobs: Vec<EnqueueJob>,
}

/// Response body for a single-job clear.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedJob {
    pub job_id: JobId,
    pub group_id: JobId,
}

/// Listing snapshot with the revision it was built from.
#[derive(Debug, Clone)]
pub(crate) struct CachedListing {
    pub revision: u64,
    pub groups: std::sync::Arc<Vec<JobGroup>>,
}
