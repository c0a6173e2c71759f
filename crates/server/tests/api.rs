use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use jobdeck_server::{create_app_with_state, AppState, Config};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Helper to make a request to the app.
async fn request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    let body = if let Some(json) = body {
        builder = builder.header("content-type", "application/json");
        Body::from(serde_json::to_string(&json).unwrap())
    } else {
        Body::empty()
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn app(auto_start: bool) -> (axum::Router, Arc<AppState>) {
    let state = AppState::new(Config {
        auto_start,
        ..Config::default()
    });
    (create_app_with_state(Arc::clone(&state)), state)
}

async fn wait_for_group_status(app: &axum::Router, group_id: &str, status: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let (_, groups) = request(app.clone(), "GET", "/api/jobs/reports", None).await;
        let group = groups
            .as_array()
            .unwrap()
            .iter()
            .find(|g| g["id"] == group_id)
            .cloned()
            .unwrap();
        if group["status"] == status {
            return group;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "group stuck at {}",
            group["status"]
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn group_runs_to_completion() {
    let (app, _) = app(true);

    let (status, group) = request(
        app.clone(),
        "POST",
        "/api/jobs",
        Some(json!({"jobs": [
            {"name": "Scan", "action": "wait", "metadata": {"steps": 3, "step_ms": 1}},
            {"name": "Thumbnails", "action": "wait", "metadata": {"steps": 2, "step_ms": 1}}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_str().unwrap().to_string();

    let group = wait_for_group_status(&app, &group_id, "Completed").await;
    assert_eq!(group["completed_tasks"], 5);
    assert_eq!(group["total_tasks"], 5);
    assert_eq!(group["jobs"][1]["message"], "Step 2 done");
}

#[tokio::test]
async fn failed_member_fails_group_and_pause_reports_one_notice() {
    let (app, _) = app(true);

    let (_, group) = request(
        app.clone(),
        "POST",
        "/api/jobs",
        Some(json!({"jobs": [
            {"name": "Broken", "action": "wait", "metadata": {"steps": 2, "step_ms": 1, "fail_at": 0}},
            {"name": "Never", "action": "wait"}
        ]})),
    )
    .await;
    let group_id = group["id"].as_str().unwrap().to_string();

    let group = wait_for_group_status(&app, &group_id, "Failed").await;
    assert_eq!(group["jobs"][0]["errors_text"][0], "step 1 failed");
    assert_eq!(group["jobs"][1]["status"], "Queued");

    // Nothing is running, so pause is a no-op with a success notice.
    let uri = format!("/api/jobs/groups/{group_id}/pause");
    let (status, body) = request(app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attempted"], json!([]));
    assert_eq!(body["notice"]["kind"], "success");
}

#[tokio::test]
async fn pause_then_resume_group() {
    let (app, _) = app(true);

    let (_, group) = request(
        app.clone(),
        "POST",
        "/api/jobs",
        Some(json!({"jobs": [
            {"name": "Long", "action": "wait", "metadata": {"steps": 200, "step_ms": 5}}
        ]})),
    )
    .await;
    let group_id = group["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        app.clone(),
        "POST",
        &format!("/api/jobs/groups/{group_id}/pause"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    wait_for_group_status(&app, &group_id, "Paused").await;

    let (_, body) = request(
        app.clone(),
        "POST",
        &format!("/api/jobs/groups/{group_id}/resume"),
        None,
    )
    .await;
    assert_eq!(body["notice"]["message"], "Job has been resumed");
    wait_for_group_status(&app, &group_id, "Running").await;

    let (status, _) = request(app.clone(), "DELETE", &format!("/api/jobs/groups/{group_id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, groups) = request(app, "GET", "/api/jobs/reports", None).await;
    assert_eq!(groups, json!([]));
}

#[tokio::test]
async fn clear_finished_removes_only_terminal_reports() {
    let (app, state) = app(false);

    let (_, done) = request(
        app.clone(),
        "POST",
        "/api/jobs",
        Some(json!({"jobs": [{"name": "Done", "action": "wait"}]})),
    )
    .await;
    let (_, _live) = request(
        app.clone(),
        "POST",
        "/api/jobs",
        Some(json!({"jobs": [{"name": "Waiting", "action": "wait"}]})),
    )
    .await;

    let done_id = done["id"].as_str().unwrap().to_string();
    request(app.clone(), "POST", &format!("/api/jobs/groups/{done_id}/cancel"), None).await;

    let (status, body) = request(app, "POST", "/api/jobs/clear-finished", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert_eq!(state.jobs.list_groups().len(), 1);
}

#[tokio::test]
async fn sync_log_round_trip() {
    let (app, _) = app(false);

    for (id, data) in [
        (1, json!("c")),
        (1, json!({"u": {"field": "name", "value": "Tag"}})),
        (2, json!("c")),
        (1, json!("d")),
    ] {
        let (status, _) = request(
            app.clone(),
            "POST",
            "/api/sync/messages",
            Some(json!({"model": "tag", "record_id": id, "data": data})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, page) = request(app.clone(), "GET", "/api/sync/messages?since=2", None).await;
    assert_eq!(page["operations"].as_array().unwrap().len(), 2);
    assert_eq!(page["nextCursor"], 4);

    let (_, groups) = request(app, "GET", "/api/sync/messages/grouped", None).await;
    let sizes: Vec<usize> = groups
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["messages"].as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![2, 1, 1]);
}

#[tokio::test]
async fn backfill_without_file_completes_empty() {
    let (app, state) = app(false);
    let mut rx = state.sync.subscribe();

    let (status, _) = request(app, "POST", "/api/sync/backfill", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "backfillCompleted");
    assert_eq!(json["summary"]["appended"], 0);
}

#[tokio::test]
async fn backfill_from_missing_file_reports_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = AppState::new(Config {
        backfill_file: Some(dir.path().join("missing.json")),
        ..Config::default()
    });
    let app = create_app_with_state(Arc::clone(&state));
    let mut rx = state.sync.subscribe();

    let (status, _) = request(app, "POST", "/api/sync/backfill", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "backfillFailed");
}
