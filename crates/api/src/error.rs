//! HTTP error mapping.
//!
//! Every handler error becomes a JSON body `{"error": ..., "code": ...}`
//! with a status that reflects who is at fault: the caller (400), this
//! service still starting (503), the backend being down (503) or slow
//! (504), or the backend misbehaving (502).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use comfybridge_orchestrator::JobError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Job(#[from] JobError),

    /// The supervisor has not yet seen the backend come up.
    #[error("service is initializing; backend not ready")]
    NotReady,

    /// A passthrough request to the backend failed.
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Job(JobError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            AppError::Job(JobError::BackendUnavailable { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable")
            }
            AppError::Job(JobError::Timeout { .. }) => {
                (StatusCode::GATEWAY_TIMEOUT, "timeout")
            }
            AppError::Job(_) => (StatusCode::BAD_GATEWAY, "job_failed"),
            AppError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        } else {
            tracing::warn!(code, error = %self, "request rejected");
        }
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}
