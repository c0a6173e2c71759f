// crates/server/src/routes/health.rs
//! Health check endpoint for the API.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Response for the health check endpoint.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Number of jobs per status.
    pub jobs: BTreeMap<String, usize>,
    /// Job actions with a registered executor.
    pub actions: Vec<String>,
    pub sync_operations: usize,
    pub backfilling: bool,
}

/// GET /api/health - Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let jobs = state
        .jobs
        .status_counts()
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), count))
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        jobs,
        actions: state.jobs.runner().registry().actions(),
        sync_operations: state.sync.len(),
        backfilling: state.sync.is_backfilling(),
    })
}

/// Create the health routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}
