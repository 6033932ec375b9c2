//! The backend capability the orchestrator runs against.
//!
//! Instead of reaching for a process-wide client, the orchestrator is handed
//! a [`Backend`] at construction. Production uses [`ComfyApi`]; tests hand
//! in fakes with call counters.

use std::time::Duration;

use async_trait::async_trait;
use comfybridge_comfyui::api::{ArtifactRef, ComfyApi, ComfyApiError, HistoryEntry};

/// Request/response operations against the generation backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Poll until reachable; `false` means the backend never came up.
    async fn wait_until_ready(&self, max_attempts: u32, interval: Duration) -> bool;

    /// Stage one input image. Per-asset: a failure names the asset.
    async fn upload_image(&self, name: &str, payload: &str) -> Result<(), ComfyApiError>;

    /// Queue a workflow; returns the backend-assigned prompt id.
    async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<String, ComfyApiError>;

    /// Fetch the outputs a finished prompt produced.
    async fn get_history(&self, prompt_id: &str) -> Result<HistoryEntry, ComfyApiError>;

    /// Download one artifact. Best-effort: `None` on any failure.
    async fn get_artifact(&self, artifact: &ArtifactRef) -> Option<Vec<u8>>;
}

#[async_trait]
impl Backend for ComfyApi {
    async fn wait_until_ready(&self, max_attempts: u32, interval: Duration) -> bool {
        ComfyApi::wait_until_ready(self, max_attempts, interval).await
    }

    async fn upload_image(&self, name: &str, payload: &str) -> Result<(), ComfyApiError> {
        ComfyApi::upload_image(self, name, payload).await
    }

    async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<String, ComfyApiError> {
        ComfyApi::submit_workflow(self, workflow, client_id).await
    }

    async fn get_history(&self, prompt_id: &str) -> Result<HistoryEntry, ComfyApiError> {
        ComfyApi::get_history(self, prompt_id).await
    }

    async fn get_artifact(&self, artifact: &ArtifactRef) -> Option<Vec<u8>> {
        ComfyApi::get_artifact(self, artifact).await
    }
}
