// crates/core/src/error.rs
use thiserror::Error;

use crate::job::{JobAction, JobId, JobStatus};

/// Errors raised by job store and runner operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job group not found: {0}")]
    GroupNotFound(JobId),

    #[error("Cannot {action} a job that is {from}")]
    InvalidState { from: JobStatus, action: JobAction },

    #[error("Invalid job request: {0}")]
    Invalid(String),

    #[error("Job runner unavailable: {0}")]
    Unavailable(String),

    #[error("Internal job error: {0}")]
    Internal(String),
}

impl JobError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound(_) | Self::GroupNotFound(_))
    }
}

/// Errors raised by the replication log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Invalid operation: {0}")]
    Invalid(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Sync log unavailable: {0}")]
    Unavailable(String),

    #[error("Internal sync error: {0}")]
    Internal(String),
}

pub type JobResult<T> = Result<T, JobError>;
pub type SyncResult<T> = Result<T, SyncError>;
