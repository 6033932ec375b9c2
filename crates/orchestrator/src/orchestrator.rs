//! The job lifecycle.

use std::sync::Arc;
use std::time::Duration;

use comfybridge_comfyui::monitor::{wait_for_completion, StreamConnector};
use comfybridge_comfyui::reconnect::ReconnectConfig;
use comfybridge_storage::ArtifactSink;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::error::JobError;
use crate::types::{validate, JobRequest, JobResult, JobStatus};

/// Lifecycle tuning. Defaults mirror the worker's long-standing values:
/// 500 readiness probes at 50 ms, 5 reconnect attempts at 3 s.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub readiness_max_attempts: u32,
    pub readiness_interval: Duration,
    /// Wall-clock ceiling on the whole readiness wait, independent of the
    /// per-probe bounds.
    pub readiness_budget: Duration,
    pub reconnect: ReconnectConfig,
    /// Wall-clock ceiling on monitoring a single job to completion.
    pub job_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            readiness_max_attempts: 500,
            readiness_interval: Duration::from_millis(50),
            readiness_budget: Duration::from_secs(120),
            reconnect: ReconnectConfig::default(),
            job_timeout: Duration::from_secs(600),
        }
    }
}

/// Runs one job at a time from validation through artifact relocation.
///
/// Holds no cross-job state: each `run` call builds its own session (fresh
/// client id, its own WebSocket) and tears it down on every exit path, so
/// any number of jobs may run concurrently on separate tasks. The shared
/// pieces -- the HTTP connection pool inside the backend and the sink --
/// are both safe for concurrent use.
pub struct JobOrchestrator<B, C> {
    backend: B,
    connector: C,
    sink: Arc<dyn ArtifactSink>,
    config: OrchestratorConfig,
}

impl<B: Backend, C: StreamConnector> JobOrchestrator<B, C> {
    pub fn new(
        backend: B,
        connector: C,
        sink: Arc<dyn ArtifactSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            connector,
            sink,
            config,
        }
    }

    /// Drive one job to a terminal outcome.
    ///
    /// Fatal failures (validation, readiness, upload, submission, stream
    /// loss, execution error, missing history) abort with a structured
    /// [`JobError`]; per-artifact fetch or relocation failures are recorded
    /// in [`JobResult::errors`] and do not abort, since partial output is
    /// still useful.
    ///
    /// Cancelling `cancel` (or dropping the returned future) closes the
    /// notification stream and abandons polling. The backend has no
    /// cancellation contract and may keep generating unattended; that is an
    /// accepted resource boundary, not a correctness bug.
    pub async fn run(
        &self,
        request: JobRequest,
        cancel: &CancellationToken,
    ) -> Result<JobResult, JobError> {
        // 1. Validate before any network traffic.
        validate(&request)?;

        // 2. Readiness. The poll itself is bounded by attempts x interval;
        //    the budget is a wall-clock backstop on top.
        let ready = tokio::time::timeout(
            self.config.readiness_budget,
            self.backend.wait_until_ready(
                self.config.readiness_max_attempts,
                self.config.readiness_interval,
            ),
        )
        .await
        .map_err(|_| JobError::Timeout {
            phase: "readiness",
            budget: self.config.readiness_budget,
        })?;
        if !ready {
            return Err(JobError::BackendUnavailable {
                attempts: self.config.readiness_max_attempts,
            });
        }

        // 3. Stage inputs sequentially; the first failure aborts, later
        //    assets are never attempted. All inputs are required before a
        //    submission is meaningful.
        for image in &request.images {
            self.backend
                .upload_image(&image.name, &image.image)
                .await
                .map_err(|source| JobError::InputUpload { source })?;
        }

        // 4. Submit, correlated to this job's session.
        let client_id = uuid::Uuid::new_v4().to_string();
        let prompt_id = self
            .backend
            .submit_workflow(&request.workflow, &client_id)
            .await
            .map_err(|source| JobError::Submit { source })?;
        tracing::info!(%prompt_id, %client_id, "workflow queued");

        // 5. Monitor to a terminal state. A failed initial handshake is
        //    fatal; the monitor owns the stream and closes it on every
        //    exit path, including ours.
        let stream = self
            .connector
            .open(&client_id)
            .await
            .map_err(|e| JobError::StreamConnect {
                detail: e.to_string(),
            })?;
        wait_for_completion(
            stream,
            &self.connector,
            &client_id,
            &prompt_id,
            &self.config.reconnect,
            self.config.job_timeout,
            cancel,
        )
        .await?;

        // 6. Collect the outputs.
        let history = self
            .backend
            .get_history(&prompt_id)
            .await
            .map_err(|source| JobError::History { source })?;

        // 7. Fetch and relocate each artifact; failures are recorded and
        //    skipped.
        let mut artifacts = Vec::new();
        let mut errors = Vec::new();
        for (node_id, output) in &history.outputs {
            for artifact in &output.images {
                let Some(bytes) = self.backend.get_artifact(artifact).await else {
                    errors.push(format!(
                        "failed to fetch artifact '{}' from node {node_id}",
                        artifact.filename
                    ));
                    continue;
                };
                match self.sink.put(&bytes, &artifact.filename).await {
                    Ok(relocated) => artifacts.push(relocated),
                    Err(e) => {
                        tracing::warn!(error = %e, "artifact relocation failed");
                        errors.push(e.to_string());
                    }
                }
            }
        }

        tracing::info!(
            %prompt_id,
            artifacts = artifacts.len(),
            errors = errors.len(),
            "job finished",
        );

        // 8. The pipeline itself succeeded, even if some artifacts were
        //    lost along the way.
        Ok(JobResult {
            status: JobStatus::Success,
            prompt_id,
            artifacts,
            errors,
        })
    }
}
