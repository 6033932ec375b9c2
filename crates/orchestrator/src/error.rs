//! The job-level error taxonomy.
//!
//! Every fatal class short-circuits [`crate::JobOrchestrator::run`] and
//! surfaces with its originating detail preserved as structure, never a
//! flattened string, so callers can branch on cause. Caller-input errors
//! and backend-reported execution errors are never retried; only transient
//! transport failures (readiness polling, stream reconnection) are, with
//! explicit bounds.

use std::time::Duration;

use comfybridge_comfyui::api::ComfyApiError;
use comfybridge_comfyui::monitor::MonitorError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The request failed shape validation; no network calls were made.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The backend never became reachable within the readiness bounds.
    #[error("ComfyUI unreachable after {attempts} readiness probes")]
    BackendUnavailable { attempts: u32 },

    /// An input image failed to stage; the job aborted before submission.
    #[error("input upload failed: {source}")]
    InputUpload {
        #[source]
        source: ComfyApiError,
    },

    /// Workflow submission was rejected or returned no prompt id.
    #[error("workflow submission failed: {source}")]
    Submit {
        #[source]
        source: ComfyApiError,
    },

    /// The initial WebSocket handshake failed (never retried).
    #[error("notification stream connect failed: {detail}")]
    StreamConnect { detail: String },

    /// The stream dropped mid-job and bounded reconnection ran out.
    #[error("stream reconnect exhausted after {attempts} attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },

    /// ComfyUI reported the generation itself failed.
    #[error("execution failed at node '{node_id}' ({kind}): {message}")]
    Execution {
        node_id: String,
        kind: String,
        message: String,
    },

    /// Execution finished but its history could not be retrieved.
    #[error("execution history unavailable: {source}")]
    History {
        #[source]
        source: ComfyApiError,
    },

    /// A wall-clock budget elapsed; distinct from the backend rejecting or
    /// erroring so callers can tell "never finished" from "failed".
    #[error("timed out during {phase} after {budget:?}")]
    Timeout {
        phase: &'static str,
        budget: Duration,
    },

    /// The caller cancelled the job. The backend is not told to stop and
    /// may keep generating unattended.
    #[error("job cancelled")]
    Cancelled,
}

impl From<MonitorError> for JobError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::ExecutionFailed {
                node_id,
                kind,
                message,
            } => JobError::Execution {
                node_id,
                kind,
                message,
            },
            MonitorError::ReconnectExhausted {
                attempts,
                last_error,
            } => JobError::ReconnectExhausted {
                attempts,
                last_error,
            },
            MonitorError::TimedOut { budget } => JobError::Timeout {
                phase: "execution",
                budget,
            },
            MonitorError::Cancelled => JobError::Cancelled,
        }
    }
}
