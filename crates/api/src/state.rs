//! Shared handler state.

use std::sync::Arc;

use comfybridge_comfyui::api::ComfyApi;
use comfybridge_comfyui::client::ComfyClient;
use comfybridge_orchestrator::JobOrchestrator;

use crate::supervisor::Supervisor;

/// Everything the handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    /// REST client, shared with the orchestrator's backend.
    pub api: ComfyApi,
    pub orchestrator: Arc<JobOrchestrator<ComfyApi, ComfyClient>>,
    pub supervisor: Arc<Supervisor>,
}
