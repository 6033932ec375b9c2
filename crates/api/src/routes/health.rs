//! Liveness and readiness endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct RootResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
pub struct HealthzResponse {
    status: &'static str,
    backend_reachable: bool,
}

/// `GET /` -- process liveness. Answers as soon as the server is up,
/// independent of the backend.
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /healthz` -- readiness. Always 200: orchestration platforms probe
/// this during startup, and a 5xx would count against restart policies.
/// The body distinguishes "serving" from "still waiting for the backend".
pub async fn healthz(State(state): State<AppState>) -> Json<HealthzResponse> {
    let ready = state.supervisor.is_ready();
    let backend = state.api.server_status().await;
    Json(HealthzResponse {
        status: if ready { "ok" } else { "initializing" },
        backend_reachable: backend.reachable,
    })
}
