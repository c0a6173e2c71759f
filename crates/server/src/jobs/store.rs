// crates/server/src/jobs/store.rs
//! In-memory registry of job reports.
//!
//! The store owns every [`JobState`], answers the grouped listing and fans
//! group commands out to the members. Execution itself is delegated to the
//! [`JobRunner`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use jobdeck_core::{
    group_jobs, JobAction, JobError, JobGroup, JobId, JobReport, JobResult, JobStatus,
};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::runner::JobRunner;
use super::state::JobState;
use super::types::{
    CachedListing, ClearedJob, EnqueueGroup, GroupActionOutcome, GroupCommand, JobEvent,
    JobFailure,
};

#[derive(Default)]
struct Jobs {
    /// Insertion order, which is also execution order within a group.
    order: Vec<JobId>,
    by_id: HashMap<JobId, Arc<JobState>>,
}

impl Jobs {
    fn members(&self, group_id: JobId) -> Vec<Arc<JobState>> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .filter(|job| job.group_id() == group_id)
            .cloned()
            .collect()
    }

    fn remove(&mut self, job_id: JobId) -> Option<Arc<JobState>> {
        let job = self.by_id.remove(&job_id)?;
        self.order.retain(|id| *id != job_id);
        Some(job)
    }
}

pub struct JobStore {
    jobs: RwLock<Jobs>,
    cache: RwLock<Option<CachedListing>>,
    /// Bumped by every mutation of any job; the listing cache is keyed on it.
    revision: Arc<AtomicU64>,
    runner: Arc<JobRunner>,
    events: broadcast::Sender<JobEvent>,
    auto_start: bool,
}

impl JobStore {
    /// `auto_start` resumes the first job of every enqueued group right away.
    pub fn new(runner: Arc<JobRunner>, event_capacity: usize, auto_start: bool) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            jobs: RwLock::new(Jobs::default()),
            cache: RwLock::new(None),
            revision: Arc::new(AtomicU64::new(0)),
            runner,
            events,
            auto_start,
        }
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    fn read(&self) -> RwLockReadGuard<'_, Jobs> {
        self.jobs.read().unwrap_or_else(|poisoned| {
            tracing::error!("job store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Jobs> {
        self.jobs.write().unwrap_or_else(|poisoned| {
            tracing::error!("job store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn invalidate(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// All groups in first-insertion order.
    pub fn list_groups(&self) -> Arc<Vec<JobGroup>> {
        let revision = self.revision.load(Ordering::Acquire);
        match self.cache.read() {
            Ok(cache) => {
                if let Some(cached) = cache.as_ref() {
                    if cached.revision == revision {
                        return Arc::clone(&cached.groups);
                    }
                }
            }
            Err(e) => tracing::error!("RwLock poisoned reading listing cache: {e}"),
        }

        let reports: Vec<JobReport> = {
            let jobs = self.read();
            jobs.order
                .iter()
                .filter_map(|id| jobs.by_id.get(id))
                .map(|job| job.snapshot())
                .collect()
        };
        let groups = Arc::new(group_jobs(&reports, Utc::now()));

        match self.cache.write() {
            Ok(mut cache) => {
                *cache = Some(CachedListing {
                    revision,
                    groups: Arc::clone(&groups),
                });
            }
            Err(e) => tracing::error!("RwLock poisoned writing listing cache: {e}"),
        }
        groups
    }

    pub fn get_job(&self, job_id: JobId) -> JobResult<JobReport> {
        self.read()
            .by_id
            .get(&job_id)
            .map(|job| job.snapshot())
            .ok_or(JobError::JobNotFound(job_id))
    }

    pub fn get_group(&self, group_id: JobId) -> JobResult<JobGroup> {
        let reports: Vec<JobReport> = self
            .read()
            .members(group_id)
            .iter()
            .map(|job| job.snapshot())
            .collect();
        group_jobs(&reports, Utc::now())
            .into_iter()
            .next()
            .ok_or(JobError::GroupNotFound(group_id))
    }

    /// Register a new group. The first job's id becomes the group id.
    pub fn enqueue(&self, request: EnqueueGroup) -> JobResult<JobGroup> {
        if request.jobs.is_empty() {
            return Err(JobError::Invalid("a job group needs at least one job".to_string()));
        }

        let group_id = Uuid::new_v4();
        {
            let mut jobs = self.write();
            for (i, requested) in request.jobs.into_iter().enumerate() {
                let id = if i == 0 { group_id } else { Uuid::new_v4() };
                let mut report = JobReport::new(id, group_id, requested.name, requested.action);
                report.metadata = requested.metadata;
                let state = Arc::new(JobState::new(
                    report,
                    self.events.clone(),
                    Arc::clone(&self.revision),
                ));
                jobs.order.push(id);
                jobs.by_id.insert(id, state);
            }
        }
        self.invalidate();
        tracing::info!(group_id = %group_id, "job group enqueued");
        let _ = self.events.send(JobEvent::Enqueued { group_id });

        if self.auto_start {
            let members = self.read().members(group_id);
            if let Some(first) = members.first() {
                self.runner.apply(first, JobAction::Resume, &members)?;
            }
        }
        self.get_group(group_id)
    }

    pub fn resume(&self, group_id: JobId) -> JobResult<GroupActionOutcome> {
        self.apply_to_group(group_id, JobAction::Resume)
    }

    pub fn pause(&self, group_id: JobId) -> JobResult<GroupActionOutcome> {
        self.apply_to_group(group_id, JobAction::Pause)
    }

    pub fn cancel(&self, group_id: JobId) -> JobResult<GroupActionOutcome> {
        self.apply_to_group(group_id, JobAction::Cancel)
    }

    /// Apply `action` to every member whose status permits it. Members are
    /// attempted independently and failures are collected, not propagated.
    fn apply_to_group(&self, group_id: JobId, action: JobAction) -> JobResult<GroupActionOutcome> {
        let members = self.read().members(group_id);
        if members.is_empty() {
            return Err(JobError::GroupNotFound(group_id));
        }

        let mut outcome = GroupActionOutcome::new(group_id, GroupCommand::from(action));
        for job in &members {
            if !job.status().permits(action) {
                continue;
            }
            outcome.attempted.push(job.id());
            if let Err(e) = self.runner.apply(job, action, &members) {
                tracing::warn!(job_id = %job.id(), group_id = %group_id, action = %action, error = %e, "group command failed for job");
                outcome.failures.push(JobFailure::new(job.id(), &e));
            }
        }

        tracing::info!(
            group_id = %group_id,
            action = %action,
            attempted = outcome.attempted.len(),
            failed = outcome.failures.len(),
            "group command applied"
        );
        Ok(outcome)
    }

    /// Remove one report. A job that is still live is canceled first so its
    /// executor stops.
    pub fn clear(&self, job_id: JobId) -> JobResult<ClearedJob> {
        let job = self
            .write()
            .remove(job_id)
            .ok_or(JobError::JobNotFound(job_id))?;

        if !job.status().is_terminal() {
            // Cancel can only fail if the job finished in the meantime.
            let _ = job.apply(JobAction::Cancel);
        }
        self.invalidate();

        let cleared = ClearedJob {
            job_id,
            group_id: job.group_id(),
        };
        tracing::info!(job_id = %job_id, group_id = %cleared.group_id, "job cleared");
        let _ = self.events.send(JobEvent::Cleared {
            job_id,
            group_id: cleared.group_id,
        });
        Ok(cleared)
    }

    /// Remove every member of a group.
    pub fn clear_group(&self, group_id: JobId) -> JobResult<GroupActionOutcome> {
        let members = self.read().members(group_id);
        if members.is_empty() {
            return Err(JobError::GroupNotFound(group_id));
        }

        let mut outcome = GroupActionOutcome::new(group_id, GroupCommand::Clear);
        for job in &members {
            outcome.attempted.push(job.id());
            if let Err(e) = self.clear(job.id()) {
                outcome.failures.push(JobFailure::new(job.id(), &e));
            }
        }
        Ok(outcome)
    }

    /// Remove every report in a terminal state. Returns the number removed.
    pub fn clear_finished(&self) -> usize {
        let finished: Vec<JobId> = {
            let jobs = self.read();
            jobs.order
                .iter()
                .filter(|id| {
                    jobs.by_id
                        .get(*id)
                        .is_some_and(|job| job.status().is_terminal())
                })
                .copied()
                .collect()
        };

        let removed = finished
            .into_iter()
            .filter(|id| self.clear(*id).is_ok())
            .count();
        if removed > 0 {
            tracing::info!(removed, "finished jobs cleared");
        }
        removed
    }

    /// Number of jobs per status, for the health summary.
    pub fn status_counts(&self) -> HashMap<JobStatus, usize> {
        let mut counts = HashMap::new();
        for job in self.read().by_id.values() {
            *counts.entry(job.status()).or_insert(0) += 1;
        }
        counts
    }
}
