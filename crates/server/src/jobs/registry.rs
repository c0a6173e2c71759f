// crates/server/src/jobs/registry.rs
//! Executors that perform the work behind a job's `action`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use jobdeck_core::JobReport;

/// Work performed for one job action.
///
/// The runner asks for the task count once, then runs tasks one at a time in
/// index order. Pausing and canceling happen between tasks.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Number of tasks the job consists of.
    async fn prepare(&self, job: &JobReport) -> Result<u64, String>;

    /// Run task `index`, returning the progress message to publish.
    async fn run_task(&self, job: &JobReport, index: u64) -> Result<String, String>;
}

/// Maps job actions to their executors.
#[derive(Default)]
pub struct JobRegistry {
    executors: RwLock<HashMap<String, Arc<dyn JobExecutor>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the executors every server ships with.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(WaitExecutor::ACTION, Arc::new(WaitExecutor));
        registry
    }

    pub fn register(&self, action: impl Into<String>, executor: Arc<dyn JobExecutor>) {
        match self.executors.write() {
            Ok(mut executors) => {
                executors.insert(action.into(), executor);
            }
            Err(e) => tracing::error!("RwLock poisoned writing executor registry: {e}"),
        }
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn JobExecutor>> {
        match self.executors.read() {
            Ok(executors) => executors.get(action).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading executor registry: {e}");
                None
            }
        }
    }

    pub fn actions(&self) -> Vec<String> {
        match self.executors.read() {
            Ok(executors) => {
                let mut actions: Vec<String> = executors.keys().cloned().collect();
                actions.sort();
                actions
            }
            Err(e) => {
                tracing::error!("RwLock poisoned reading executor registry: {e}");
                Vec::new()
            }
        }
    }
}

/// Sleeps through a fixed number of steps.
///
/// Metadata: `{"steps": <u64>, "step_ms": <u64>, "fail_at": <u64>?}`. Defaults
/// to one step of 100ms. `fail_at` makes that step fail, which is useful when
/// exercising the failure path end to end.
pub struct WaitExecutor;

impl WaitExecutor {
    pub const ACTION: &'static str = "wait";

    fn param(job: &JobReport, key: &str) -> Option<u64> {
        job.metadata.get(key).and_then(|v| v.as_u64())
    }
}

#[async_trait]
impl JobExecutor for WaitExecutor {
    async fn prepare(&self, job: &JobReport) -> Result<u64, String> {
        Ok(Self::param(job, "steps").unwrap_or(1))
    }

    async fn run_task(&self, job: &JobReport, index: u64) -> Result<String, String> {
        let step_ms = Self::param(job, "step_ms").unwrap_or(100);
        tokio::time::sleep(Duration::from_millis(step_ms)).await;
        if Self::param(job, "fail_at") == Some(index) {
            return Err(format!("step {} failed", index + 1));
        }
        Ok(format!("Step {} done", index + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn report(metadata: serde_json::Value) -> JobReport {
        let id = Uuid::new_v4();
        let mut r = JobReport::new(id, id, "wait", WaitExecutor::ACTION);
        r.metadata = metadata;
        r
    }

    #[test]
    fn test_builtin_registry() {
        let registry = JobRegistry::with_builtin();
        assert!(registry.get("wait").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.actions(), vec!["wait".to_string()]);
    }

    #[tokio::test]
    async fn test_wait_executor_steps() {
        let job = report(json!({"steps": 3, "step_ms": 1}));
        assert_eq!(WaitExecutor.prepare(&job).await.unwrap(), 3);
        assert_eq!(WaitExecutor.run_task(&job, 0).await.unwrap(), "Step 1 done");
    }

    #[tokio::test]
    async fn test_wait_executor_fail_at() {
        let job = report(json!({"steps": 2, "step_ms": 1, "fail_at": 1}));
        assert!(WaitExecutor.run_task(&job, 0).await.is_ok());
        assert_eq!(
            WaitExecutor.run_task(&job, 1).await.unwrap_err(),
            "step 2 failed"
        );
    }
}
