//! Replication log endpoints.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jobdeck_core::{CrdtOperation, MessageGroup, NewCrdtOperation};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use ts_rs::TS;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::sync::LogPage;

/// Response for successful backfill initiation.
#[derive(Debug, Clone, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct SyncAcceptedResponse {
    pub message: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Log position to read from.
    pub since: Option<usize>,
}

/// GET /api/sync/messages?since=N - Operations from a cursor to the end.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> ApiResult<Json<LogPage>> {
    let Query(query) = query?;
    Ok(Json(state.sync.page(query.since)))
}

/// GET /api/sync/messages/grouped - The log as contiguous per-record runs.
pub async fn grouped_messages(State(state): State<Arc<AppState>>) -> Json<Vec<MessageGroup>> {
    Json(state.sync.grouped())
}

/// POST /api/sync/messages - Append one operation.
pub async fn append_message(
    State(state): State<Arc<AppState>>,
    op: Result<Json<NewCrdtOperation>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CrdtOperation>)> {
    let Json(op) = op?;
    let appended = state.sync.append(op)?;
    Ok((StatusCode::CREATED, Json(appended)))
}

/// POST /api/sync/backfill - Replay historical operations into the log.
///
/// Returns:
/// - 202 Accepted: Backfill started
/// - 409 Conflict: A backfill is already running
///
/// Completion is announced on `/api/sync/stream`.
pub async fn trigger_backfill(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    state.sync.start_backfill()?;
    tracing::info!("Backfill triggered via API");

    let response = SyncAcceptedResponse {
        message: "Backfill initiated".to_string(),
        status: "accepted".to_string(),
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

/// GET /api/sync/stream - SSE stream of appended operations and backfill
/// results.
///
/// A client that falls behind receives a `lagged` event carrying the number
/// of missed events and should re-query `/api/sync/messages`.
pub async fn stream_sync(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.sync.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(event.kind()).data(data));
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "sync SSE client lagged");
                    yield Ok(Event::default().event("lagged").data(format!("{{\"missed\":{n}}}")));
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

/// Create the sync routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/messages", get(list_messages).post(append_message))
        .route("/sync/messages/grouped", get(grouped_messages))
        .route("/sync/backfill", post(trigger_backfill))
        .route("/sync/stream", get(stream_sync))
}
