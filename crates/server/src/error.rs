// crates/server/src/error.rs
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jobdeck_core::{JobError, SyncError};
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Job(job_err) => match job_err {
                JobError::JobNotFound(id) | JobError::GroupNotFound(id) => {
                    tracing::warn!(id = %id, "{job_err}");
                    (
                        StatusCode::NOT_FOUND,
                        ErrorResponse::with_details("Not found", job_err.to_string()),
                    )
                }
                JobError::InvalidState { from, action } => {
                    tracing::warn!(status = %from, action = %action, "Rejected job transition");
                    (
                        StatusCode::CONFLICT,
                        ErrorResponse::with_details("Invalid job state", job_err.to_string()),
                    )
                }
                JobError::Invalid(msg) => {
                    tracing::warn!(message = %msg, "Bad job request");
                    (
                        StatusCode::BAD_REQUEST,
                        ErrorResponse::with_details("Bad request", msg.clone()),
                    )
                }
                JobError::Unavailable(msg) => {
                    tracing::error!(message = %msg, "Job runner unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ErrorResponse::with_details("Job runner unavailable", msg.clone()),
                    )
                }
                JobError::Internal(msg) => {
                    tracing::error!(message = %msg, "Internal job error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::new("Internal server error"),
                    )
                }
            },
            ApiError::Sync(sync_err) => match sync_err {
                SyncError::Invalid(msg) => {
                    tracing::warn!(message = %msg, "Rejected sync operation");
                    (
                        StatusCode::BAD_REQUEST,
                        ErrorResponse::with_details("Invalid operation", msg.clone()),
                    )
                }
                SyncError::Conflict(msg) => {
                    tracing::warn!(message = %msg, "Conflict");
                    (
                        StatusCode::CONFLICT,
                        ErrorResponse::with_details("Conflict", msg.clone()),
                    )
                }
                SyncError::Unavailable(msg) => {
                    tracing::error!(message = %msg, "Sync log unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ErrorResponse::with_details("Sync unavailable", msg.clone()),
                    )
                }
                SyncError::Internal(msg) => {
                    tracing::error!(message = %msg, "Internal sync error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::new("Internal server error"),
                    )
                }
            },
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use jobdeck_core::{JobAction, JobStatus};
    use uuid::Uuid;

    /// Helper to extract status code and body from a response
    async fn extract_response(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, error_response)
    }

    #[tokio::test]
    async fn test_group_not_found_returns_404() {
        let id = Uuid::new_v4();
        let error = ApiError::from(JobError::GroupNotFound(id));
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Not found");
        assert!(body.details.unwrap().contains(&id.to_string()));
    }

    #[tokio::test]
    async fn test_invalid_state_returns_409() {
        let error = ApiError::from(JobError::InvalidState {
            from: JobStatus::Completed,
            action: JobAction::Pause,
        });
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body.details.as_deref(),
            Some("Cannot pause a job that is completed")
        );
    }

    #[tokio::test]
    async fn test_sync_errors_map_to_status_codes() {
        let cases = [
            (SyncError::Invalid("x".into()), StatusCode::BAD_REQUEST),
            (SyncError::Conflict("x".into()), StatusCode::CONFLICT),
            (SyncError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (SyncError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let error = ApiError::from(JobError::Internal("Something went wrong".to_string()));
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Internal server error");
        assert!(body.details.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse::new("Test error");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\":\"Test error\""));
        assert!(!json.contains("details"));

        let response = ErrorResponse::with_details("Test error", "More info");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"details\":\"More info\""));
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::from(SyncError::Conflict("busy".to_string()));
        assert_eq!(err.to_string(), "Conflict: busy");

        let err = ApiError::BadRequest("oops".to_string());
        assert_eq!(err.to_string(), "Bad request: oops");
    }
}
