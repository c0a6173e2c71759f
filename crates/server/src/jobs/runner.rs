// crates/server/src/jobs/runner.rs
//! Executes queued jobs.
//!
//! Each group gets one driver task that runs its members sequentially in
//! insertion order; drivers of different groups run concurrently. A driver
//! that sees a member end Failed or Canceled halts: the members still Queued
//! wait for an explicit resume.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use jobdeck_core::{JobAction, JobId, JobResult, JobStatus};

use super::registry::JobRegistry;
use super::state::{JobState, TaskOutcome};

#[derive(Debug, Default)]
struct Driver {
    halted: bool,
    /// Bumped by every `ensure_driver` call on a running driver.
    generation: u64,
}

/// Central runner for all job groups.
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    drivers: Mutex<HashMap<JobId, Driver>>,
}

impl JobRunner {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            registry,
            drivers: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    fn lock_drivers(&self) -> MutexGuard<'_, HashMap<JobId, Driver>> {
        self.drivers.lock().unwrap_or_else(|poisoned| {
            tracing::error!("job driver map lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether a driver task is currently attached to `group_id`.
    pub fn is_driving(&self, group_id: JobId) -> bool {
        self.lock_drivers().contains_key(&group_id)
    }

    /// Apply `action` to `job`, a member of the ordered group `members`.
    ///
    /// Resuming a Queued job only starts it immediately when every earlier
    /// member has finished; otherwise it stays Queued and runs when the
    /// group's driver reaches it. Either way the group's driver is (re)armed.
    pub fn apply(
        self: &Arc<Self>,
        job: &Arc<JobState>,
        action: JobAction,
        members: &[Arc<JobState>],
    ) -> JobResult<JobStatus> {
        match action {
            JobAction::Resume => {
                let status = if job.status() == JobStatus::Queued && !next_in_line(job, members) {
                    JobStatus::Queued
                } else {
                    job.apply(JobAction::Resume)?
                };
                self.ensure_driver(job.group_id(), members);
                Ok(status)
            }
            JobAction::Pause | JobAction::Cancel => job.apply(action),
        }
    }

    /// Attach a driver to the group unless one is already running, and clear
    /// a halt left by an earlier failure.
    pub fn ensure_driver(self: &Arc<Self>, group_id: JobId, members: &[Arc<JobState>]) {
        let mut drivers = self.lock_drivers();
        match drivers.get_mut(&group_id) {
            Some(driver) => {
                driver.halted = false;
                driver.generation = driver.generation.wrapping_add(1);
            }
            None => {
                drivers.insert(group_id, Driver::default());
                let runner = Arc::clone(self);
                let members = members.to_vec();
                tokio::spawn(async move { runner.drive(group_id, members).await });
            }
        }
    }

    async fn drive(self: Arc<Self>, group_id: JobId, members: Vec<Arc<JobState>>) {
        tracing::debug!(group_id = %group_id, jobs = members.len(), "group driver started");
        loop {
            // The exit decision is taken under the driver lock so a concurrent
            // `ensure_driver` either sees this driver or spawns a new one.
            let (next, generation) = {
                let mut drivers = self.lock_drivers();
                let (halted, generation) = drivers
                    .get(&group_id)
                    .map_or((true, 0), |d| (d.halted, d.generation));
                let next = members
                    .iter()
                    .find(|job| match job.status() {
                        JobStatus::Running | JobStatus::Paused => true,
                        JobStatus::Queued => !halted,
                        JobStatus::Completed | JobStatus::Canceled | JobStatus::Failed => false,
                    })
                    .cloned();
                if next.is_none() {
                    drivers.remove(&group_id);
                }
                (next, generation)
            };

            let Some(job) = next else {
                tracing::debug!(group_id = %group_id, "group driver idle, exiting");
                return;
            };

            if job.status() == JobStatus::Queued {
                // A concurrent resume may have started it already.
                let _ = job.apply(JobAction::Resume);
            }

            let status = self.execute(&job).await;
            if matches!(status, JobStatus::Failed | JobStatus::Canceled) {
                // A resume that re-armed the driver while the job ran wins.
                if let Some(driver) = self.lock_drivers().get_mut(&group_id) {
                    if driver.generation == generation {
                        driver.halted = true;
                    }
                }
            }
        }
    }

    /// Run one job to a terminal status.
    async fn execute(&self, job: &Arc<JobState>) -> JobStatus {
        let report = job.snapshot();
        let Some(executor) = self.registry.get(&report.action) else {
            return job.fail(format!(
                "No executor registered for action '{}'",
                report.action
            ));
        };

        tracing::info!(job_id = %report.id, group_id = %report.group_id, action = %report.action, "job started");

        if !job.is_prepared() {
            if !job.wait_until_runnable().await {
                return job.status();
            }
            match executor.prepare(&report).await {
                Ok(total) => {
                    if let TaskOutcome::Finished(status) = job.set_total(total) {
                        return finished(job, status);
                    }
                }
                Err(e) => return job.fail(e),
            }
        }

        loop {
            if !job.wait_until_runnable().await {
                return finished(job, job.status());
            }

            let report = job.snapshot();
            let index = report.completed_task_count;
            let executor = Arc::clone(&executor);
            // Spawned so a panicking executor fails the job instead of the driver.
            let result =
                tokio::spawn(async move { executor.run_task(&report, index).await }).await;

            match result {
                Ok(Ok(message)) => {
                    if let TaskOutcome::Finished(status) = job.record_task(message) {
                        return finished(job, status);
                    }
                }
                Ok(Err(e)) => return job.fail(e),
                Err(join_err) => return job.fail(format!("task panicked: {join_err}")),
            }
        }
    }
}

fn finished(job: &JobState, status: JobStatus) -> JobStatus {
    tracing::info!(job_id = %job.id(), group_id = %job.group_id(), status = %status, "job finished");
    status
}

/// Every member ahead of `job` has reached a terminal status.
fn next_in_line(job: &JobState, members: &[Arc<JobState>]) -> bool {
    members
        .iter()
        .take_while(|m| m.id() != job.id())
        .all(|m| m.status().is_terminal())
}
