//! API route handlers for the jobdeck server.

pub mod health;
pub mod jobs;
pub mod metrics;
pub mod sync;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router: every API route under `/api`, plus the
/// Prometheus scrape endpoint at `/metrics`.
///
/// Routes:
/// - GET    /api/health - Health check with job and log summary
/// - GET    /api/jobs/reports - Grouped job reports
/// - POST   /api/jobs - Enqueue a job group
/// - POST   /api/jobs/groups/{group_id}/resume - Resume a group
/// - POST   /api/jobs/groups/{group_id}/pause - Pause a group
/// - POST   /api/jobs/groups/{group_id}/cancel - Cancel a group
/// - DELETE /api/jobs/groups/{group_id} - Remove a group
/// - DELETE /api/jobs/{job_id} - Remove one job report
/// - POST   /api/jobs/clear-finished - Remove finished job reports
/// - GET    /api/jobs/stream - SSE stream of job events
/// - GET    /api/sync/messages - Operations from a cursor
/// - POST   /api/sync/messages - Append an operation
/// - GET    /api/sync/messages/grouped - Operations as per-record runs
/// - POST   /api/sync/backfill - Start a backfill
/// - GET    /api/sync/stream - SSE stream of log events
/// - GET    /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", sync::router())
        .merge(metrics::router())
        .with_state(state)
}
