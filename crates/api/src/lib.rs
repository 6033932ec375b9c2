//! HTTP surface for the ComfyUI bridge.
//!
//! A thin axum shell around the orchestrator: `/predict` runs a job,
//! `/healthz` reports readiness, `/models` passes the backend's node
//! catalog through, and `/` answers liveness. Everything stateful lives in
//! [`state::AppState`]; process startup (backend launch and readiness
//! gating) is the [`supervisor::Supervisor`]'s job.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod supervisor;
