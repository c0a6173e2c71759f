// crates/core/src/group.rs
//! Derivation of job groups from a flat, creation-ordered list of reports.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::job::{JobId, JobReport, JobStatus};

/// Jobs sharing one originating action, displayed and controlled together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
pub struct JobGroup {
    #[ts(type = "string")]
    pub id: JobId,
    pub action: String,
    pub status: JobStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub completed_tasks: u64,
    pub total_tasks: u64,
    pub elapsed_ms: u64,
    pub jobs: Vec<JobReport>,
}

impl JobGroup {
    /// The member currently running, if any.
    pub fn running_job(&self) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.status == JobStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        self.jobs.iter().all(|j| j.status.is_terminal())
    }
}

/// Aggregate status of a group's members.
///
/// Completed only when every member is Completed; Running when any member
/// runs; otherwise the status of the most recently active member. A
/// Completed member never decides the status of a group that still has
/// unfinished work, so the next most recent member is used instead.
///
/// Returns `None` for an empty slice.
pub fn aggregate_status(jobs: &[JobReport]) -> Option<JobStatus> {
    if jobs.is_empty() {
        return None;
    }
    if jobs.iter().all(|j| j.status == JobStatus::Completed) {
        return Some(JobStatus::Completed);
    }
    if jobs.iter().any(|j| j.status == JobStatus::Running) {
        return Some(JobStatus::Running);
    }

    // `max_by_key` keeps the last maximum, so ties go to the later member.
    jobs.iter()
        .filter(|j| j.status != JobStatus::Completed)
        .max_by_key(|j| j.last_activity())
        .map(|j| j.status)
}

/// Group reports by `group_id`, preserving creation order: groups are ordered
/// by first appearance and members keep their relative order.
///
/// Pure function; `now` is only used for the elapsed time of unfinished jobs.
pub fn group_jobs(reports: &[JobReport], now: DateTime<Utc>) -> Vec<JobGroup> {
    let mut order: Vec<JobId> = Vec::new();
    let mut members: HashMap<JobId, Vec<JobReport>> = HashMap::new();

    for report in reports {
        members
            .entry(report.group_id)
            .or_insert_with(|| {
                order.push(report.group_id);
                Vec::new()
            })
            .push(report.clone());
    }

    order
        .into_iter()
        .filter_map(|group_id| {
            let jobs = members.remove(&group_id)?;
            let status = aggregate_status(&jobs)?;
            let representative = jobs
                .iter()
                .find(|j| j.id == group_id)
                .unwrap_or(&jobs[0]);

            Some(JobGroup {
                id: group_id,
                action: representative.action.clone(),
                status,
                created_at: jobs[0].created_at,
                completed_tasks: jobs.iter().map(|j| j.completed_task_count).sum(),
                total_tasks: jobs.iter().map(|j| j.task_count).sum(),
                elapsed_ms: jobs.iter().map(|j| j.elapsed_ms(now)).sum(),
                jobs,
            })
        })
        .collect()
}
