//! End-to-end job orchestration.
//!
//! [`orchestrator::JobOrchestrator`] drives one generation job through its
//! whole lifecycle: validate, wait for the backend, upload inputs, submit
//! the workflow, monitor execution over WebSocket, collect the outputs and
//! relocate them to the configured sink. This crate owns the request/result
//! types and the job-level error taxonomy; the HTTP surface in the api
//! crate is a thin shell around it.

pub mod backend;
pub mod error;
pub mod orchestrator;
pub mod types;

pub use backend::Backend;
pub use error::JobError;
pub use orchestrator::{JobOrchestrator, OrchestratorConfig};
pub use types::{validate, InputImage, JobRequest, JobResult, JobStatus};
