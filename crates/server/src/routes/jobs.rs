// crates/server/src/routes/jobs.rs
//! API routes for job reports and group commands.
//!
//! - GET    /jobs/reports                  - Grouped job reports
//! - POST   /jobs                          - Enqueue a job group
//! - POST   /jobs/groups/{group_id}/resume - Resume every eligible member
//! - POST   /jobs/groups/{group_id}/pause  - Pause every running member
//! - POST   /jobs/groups/{group_id}/cancel - Cancel every live member
//! - DELETE /jobs/groups/{group_id}        - Remove a whole group
//! - DELETE /jobs/{job_id}                 - Remove one report
//! - POST   /jobs/clear-finished           - Remove every finished report
//! - GET    /jobs/stream                   - SSE stream of job events

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use jobdeck_core::{JobGroup, JobId};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::error::ApiResult;
use crate::jobs::{ClearedJob, EnqueueGroup, GroupActionOutcome, JobStore, Notice};
use crate::state::AppState;

/// Response for a group command: the per-member outcome plus the single
/// notice to show for it.
#[derive(Debug, Serialize)]
pub struct GroupActionResponse {
    #[serde(flatten)]
    pub outcome: GroupActionOutcome,
    pub notice: Notice,
}

impl From<GroupActionOutcome> for GroupActionResponse {
    fn from(outcome: GroupActionOutcome) -> Self {
        let notice = outcome.notice();
        Self { outcome, notice }
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ClearFinishedResponse {
    pub removed: usize,
}

/// GET /api/jobs/reports - All groups, oldest first.
async fn list_reports(State(state): State<Arc<AppState>>) -> Json<Vec<JobGroup>> {
    Json(state.jobs.list_groups().to_vec())
}

/// POST /api/jobs - Enqueue a group of jobs executed in the given order.
async fn enqueue(
    State(state): State<Arc<AppState>>,
    request: Result<Json<EnqueueGroup>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobGroup>)> {
    let Json(request) = request?;
    let group = state.jobs.enqueue(request)?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn resume_group(
    State(state): State<Arc<AppState>>,
    group_id: Result<Path<JobId>, PathRejection>,
) -> ApiResult<Json<GroupActionResponse>> {
    let Path(group_id) = group_id?;
    Ok(Json(state.jobs.resume(group_id)?.into()))
}

async fn pause_group(
    State(state): State<Arc<AppState>>,
    group_id: Result<Path<JobId>, PathRejection>,
) -> ApiResult<Json<GroupActionResponse>> {
    let Path(group_id) = group_id?;
    Ok(Json(state.jobs.pause(group_id)?.into()))
}

async fn cancel_group(
    State(state): State<Arc<AppState>>,
    group_id: Result<Path<JobId>, PathRejection>,
) -> ApiResult<Json<GroupActionResponse>> {
    let Path(group_id) = group_id?;
    Ok(Json(state.jobs.cancel(group_id)?.into()))
}

async fn clear_group(
    State(state): State<Arc<AppState>>,
    group_id: Result<Path<JobId>, PathRejection>,
) -> ApiResult<Json<GroupActionResponse>> {
    let Path(group_id) = group_id?;
    Ok(Json(state.jobs.clear_group(group_id)?.into()))
}

async fn clear_job(
    State(state): State<Arc<AppState>>,
    job_id: Result<Path<JobId>, PathRejection>,
) -> ApiResult<Json<ClearedJob>> {
    let Path(job_id) = job_id?;
    Ok(Json(state.jobs.clear(job_id)?))
}

async fn clear_finished(State(state): State<Arc<AppState>>) -> Json<ClearFinishedResponse> {
    Json(ClearFinishedResponse {
        removed: state.jobs.clear_finished(),
    })
}

fn snapshot_event(jobs: &JobStore) -> Event {
    Event::default()
        .event("snapshot")
        .data(serde_json::to_string(jobs.list_groups().as_ref()).unwrap_or_default())
}

/// GET /api/jobs/stream - SSE stream of job events.
///
/// Opens with a `snapshot` of all groups. A client that falls behind the
/// event buffer gets a fresh snapshot instead of the missed events.
async fn stream_jobs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let jobs = Arc::clone(&state.jobs);
    let mut rx = jobs.subscribe();

    let stream = async_stream::stream! {
        yield Ok(snapshot_event(&jobs));
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(event.kind()).data(data));
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "job SSE client lagged, re-sending snapshot");
                    yield Ok(snapshot_event(&jobs));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(enqueue))
        .route("/jobs/reports", get(list_reports))
        .route("/jobs/stream", get(stream_jobs))
        .route("/jobs/clear-finished", post(clear_finished))
        .route("/jobs/groups/{group_id}", delete(clear_group))
        .route("/jobs/groups/{group_id}/resume", post(resume_group))
        .route("/jobs/groups/{group_id}/pause", post(pause_group))
        .route("/jobs/groups/{group_id}/cancel", post(cancel_group))
        .route("/jobs/{job_id}", delete(clear_job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<AppState>) {
        let state = AppState::new(Config {
            auto_start: false,
            ..Config::default()
        });
        let app = Router::new()
            .nest("/api", router())
            .with_state(Arc::clone(&state));
        (app, state)
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let response = app
            .oneshot(builder.body(Body::from(body.unwrap_or("").to_owned())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_list_reports_empty() {
        let (app, _) = app();
        let (status, body) = send(app, Method::GET, "/api/jobs/reports", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
        assert!(json.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_then_cancel_group() {
        let (app, state) = app();
        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/api/jobs",
            Some(r#"{"jobs":[{"name":"Index","action":"wait"},{"name":"Thumbs","action":"wait"}]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let group: JobGroup = serde_json::from_str(&body).unwrap();
        assert_eq!(group.jobs.len(), 2);

        let uri = format!("/api/jobs/groups/{}/cancel", group.id);
        let (status, body) = send(app, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["notice"]["kind"], "success");
        assert_eq!(json["notice"]["message"], "Job has been canceled");
        assert_eq!(json["attempted"].as_array().unwrap().len(), 2);

        let group = state.jobs.get_group(group.id).unwrap();
        assert_eq!(group.status, jobdeck_core::JobStatus::Canceled);
    }

    #[tokio::test]
    async fn test_unknown_group_is_404() {
        let (app, _) = app();
        let uri = format!("/api/jobs/groups/{}/pause", uuid::Uuid::new_v4());
        let (status, body) = send(app, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("\"error\""));
    }

    #[tokio::test]
    async fn test_malformed_requests_are_json_400() {
        let (app, state) = app();

        let (status, body) = send(app.clone(), Method::POST, "/api/jobs", Some("{\"jobs\": 3")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Bad request");
        assert!(json["details"].is_string());
        assert!(state.jobs.list_groups().is_empty());

        let (status, body) = send(app, Method::POST, "/api/jobs/groups/not-a-uuid/resume", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Bad request");
    }

    #[tokio::test]
    async fn test_clear_job_removes_report() {
        let (app, state) = app();
        let group = state
            .jobs
            .enqueue(EnqueueGroup {
                jobs: vec![crate::jobs::EnqueueJob {
                    name: "one".into(),
                    action: "wait".into(),
                    metadata: serde_json::Value::Null,
                }],
            })
            .unwrap();

        let uri = format!("/api/jobs/{}", group.id);
        let (status, _) = send(app.clone(), Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.jobs.list_groups().is_empty());

        let (status, _) = send(app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
