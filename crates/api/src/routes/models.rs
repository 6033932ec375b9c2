//! `GET /models` -- passthrough of the backend's node/model catalog.

use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

pub async fn models(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    if !state.supervisor.is_ready() {
        return Err(AppError::NotReady);
    }

    let info = state
        .api
        .get_object_info()
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;
    Ok(Json(info))
}
