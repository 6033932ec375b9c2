//! `POST /predict` -- run one generation job to completion.

use axum::extract::State;
use axum::Json;
use comfybridge_orchestrator::{JobRequest, JobResult};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::state::AppState;

/// Synchronous job endpoint: the response carries the finished
/// [`JobResult`] with all artifacts relocated. If the caller goes away,
/// axum drops this future and monitoring stops with it.
pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> Result<Json<JobResult>, AppError> {
    if !state.supervisor.is_ready() {
        return Err(AppError::NotReady);
    }

    let cancel = CancellationToken::new();
    let result = state.orchestrator.run(request, &cancel).await?;
    Ok(Json(result))
}
