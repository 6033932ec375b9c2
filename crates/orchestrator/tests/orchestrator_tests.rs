//! End-to-end lifecycle tests against a fake backend and scripted
//! notification streams: failure policy per step, short-circuiting, bounded
//! reconnection, and partial-output handling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use comfybridge_comfyui::api::{ArtifactRef, ComfyApiError, HistoryEntry, NodeOutput};
use comfybridge_comfyui::monitor::{
    ConnectError, NotificationSource, StreamConnector, StreamDropped,
};
use comfybridge_comfyui::reconnect::ReconnectConfig;
use comfybridge_orchestrator::{
    Backend, InputImage, JobError, JobOrchestrator, JobRequest, JobStatus, OrchestratorConfig,
};
use comfybridge_storage::inline::InlineSink;
use tokio_util::sync::CancellationToken;

const PROMPT_ID: &str = "prompt-1";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    readiness_waits: AtomicU32,
    uploads: AtomicU32,
    submits: AtomicU32,
    history_fetches: AtomicU32,
    artifact_fetches: AtomicU32,
}

struct FakeBackend {
    ready: bool,
    /// Never return from the readiness wait; exercises the budget backstop.
    park_on_readiness: bool,
    /// 1-based index of the upload that should fail, if any.
    fail_upload_at: Option<u32>,
    history: HistoryEntry,
    /// Artifact filenames whose fetch should miss.
    missing_artifacts: Vec<String>,
    counters: Counters,
}

impl FakeBackend {
    fn ready_with_history(history: HistoryEntry) -> Self {
        Self {
            ready: true,
            park_on_readiness: false,
            fail_upload_at: None,
            history,
            missing_artifacts: vec![],
            counters: Counters::default(),
        }
    }

    fn ready_empty() -> Self {
        Self::ready_with_history(HistoryEntry::default())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn wait_until_ready(&self, _max_attempts: u32, _interval: Duration) -> bool {
        self.counters.readiness_waits.fetch_add(1, Ordering::SeqCst);
        if self.park_on_readiness {
            std::future::pending::<()>().await;
        }
        self.ready
    }

    async fn upload_image(&self, name: &str, _payload: &str) -> Result<(), ComfyApiError> {
        let count = self.counters.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_upload_at == Some(count) {
            return Err(ComfyApiError::Upload {
                name: name.to_string(),
                status: 500,
                body: "disk full".to_string(),
            });
        }
        Ok(())
    }

    async fn submit_workflow(
        &self,
        _workflow: &serde_json::Value,
        _client_id: &str,
    ) -> Result<String, ComfyApiError> {
        self.counters.submits.fetch_add(1, Ordering::SeqCst);
        Ok(PROMPT_ID.to_string())
    }

    async fn get_history(&self, _prompt_id: &str) -> Result<HistoryEntry, ComfyApiError> {
        self.counters.history_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.history.clone())
    }

    async fn get_artifact(&self, artifact: &ArtifactRef) -> Option<Vec<u8>> {
        self.counters.artifact_fetches.fetch_add(1, Ordering::SeqCst);
        if self.missing_artifacts.contains(&artifact.filename) {
            None
        } else {
            Some(artifact.filename.clone().into_bytes())
        }
    }
}

enum Event {
    Frame(String),
    Drop,
}

struct ScriptedStream {
    events: VecDeque<Event>,
}

#[async_trait]
impl NotificationSource for ScriptedStream {
    async fn next_frame(&mut self) -> Result<Option<String>, StreamDropped> {
        match self.events.pop_front() {
            Some(Event::Frame(text)) => Ok(Some(text)),
            Some(Event::Drop) => Err(StreamDropped("reset by peer".into())),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}

/// Hands out one scripted stream per `open` call: the first for the initial
/// handshake, the rest for reconnect attempts.
struct ScriptedConnector {
    streams: Mutex<VecDeque<Result<Vec<Event>, String>>>,
    opens: AtomicU32,
}

impl ScriptedConnector {
    fn new(streams: Vec<Result<Vec<Event>, String>>) -> Self {
        Self {
            streams: Mutex::new(streams.into_iter().collect()),
            opens: AtomicU32::new(0),
        }
    }

    fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn open(&self, _client_id: &str) -> Result<Box<dyn NotificationSource>, ConnectError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.streams.lock().unwrap().pop_front() {
            Some(Ok(events)) => Ok(Box::new(ScriptedStream {
                events: events.into(),
            })),
            Some(Err(e)) => Err(ConnectError(e)),
            None => Err(ConnectError("out of scripted streams".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn completion_frame() -> Event {
    Event::Frame(
        serde_json::json!({
            "type": "executing",
            "data": { "node": null, "prompt_id": PROMPT_ID },
        })
        .to_string(),
    )
}

fn history_with_images(filenames: &[&str]) -> HistoryEntry {
    let mut history = HistoryEntry::default();
    history.outputs.insert(
        "9".to_string(),
        NodeOutput {
            images: filenames
                .iter()
                .map(|name| ArtifactRef {
                    filename: name.to_string(),
                    subfolder: String::new(),
                    kind: "output".to_string(),
                })
                .collect(),
        },
    );
    history
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        readiness_max_attempts: 3,
        readiness_interval: Duration::from_millis(1),
        readiness_budget: Duration::from_secs(5),
        reconnect: ReconnectConfig {
            max_attempts: 2,
            delay: Duration::from_millis(1),
        },
        job_timeout: Duration::from_secs(5),
    }
}

fn request_with_images(count: usize) -> JobRequest {
    JobRequest {
        workflow: serde_json::json!({"1": {"class_type": "KSampler"}}),
        images: (0..count)
            .map(|i| InputImage {
                name: format!("input-{i}.png"),
                image: "aGVsbG8=".to_string(),
            })
            .collect(),
    }
}

async fn run(
    backend: FakeBackend,
    connector: ScriptedConnector,
    request: JobRequest,
) -> (
    Result<comfybridge_orchestrator::JobResult, JobError>,
    Arc<FakeBackend>,
    Arc<ScriptedConnector>,
) {
    let backend = Arc::new(backend);
    let connector = Arc::new(connector);
    let orchestrator = JobOrchestrator::new(
        SharedBackend(Arc::clone(&backend)),
        SharedConnector(Arc::clone(&connector)),
        Arc::new(InlineSink),
        fast_config(),
    );
    let result = orchestrator.run(request, &CancellationToken::new()).await;
    (result, backend, connector)
}

// Shared-handle delegating wrappers so the tests can keep handles to the
// fakes. (The traits and `Arc` are both foreign to this crate, so a direct
// `impl Backend for Arc<FakeBackend>` trips the orphan rule.)

struct SharedBackend(Arc<FakeBackend>);

#[async_trait]
impl Backend for SharedBackend {
    async fn wait_until_ready(&self, max_attempts: u32, interval: Duration) -> bool {
        self.0.wait_until_ready(max_attempts, interval).await
    }
    async fn upload_image(&self, name: &str, payload: &str) -> Result<(), ComfyApiError> {
        self.0.upload_image(name, payload).await
    }
    async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<String, ComfyApiError> {
        self.0.submit_workflow(workflow, client_id).await
    }
    async fn get_history(&self, prompt_id: &str) -> Result<HistoryEntry, ComfyApiError> {
        self.0.get_history(prompt_id).await
    }
    async fn get_artifact(&self, artifact: &ArtifactRef) -> Option<Vec<u8>> {
        self.0.get_artifact(artifact).await
    }
}

struct SharedConnector(Arc<ScriptedConnector>);

#[async_trait]
impl StreamConnector for SharedConnector {
    async fn open(&self, client_id: &str) -> Result<Box<dyn NotificationSource>, ConnectError> {
        self.0.open(client_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_returns_success_with_relocated_artifacts() {
    let backend = FakeBackend::ready_with_history(history_with_images(&["a.png", "b.png"]));
    let connector = ScriptedConnector::new(vec![Ok(vec![completion_frame()])]);

    let (result, backend, _) = run(backend, connector, request_with_images(1)).await;

    let result = result.expect("job should succeed");
    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.prompt_id, PROMPT_ID);
    assert_eq!(result.artifacts.len(), 2);
    assert!(result.errors.is_empty());
    assert_eq!(backend.counters.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(backend.counters.submits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_request_fails_fast_without_network_calls() {
    let backend = FakeBackend::ready_empty();
    let connector = ScriptedConnector::new(vec![]);

    let request = JobRequest {
        workflow: serde_json::json!([1, 2, 3]),
        images: vec![],
    };
    let (result, backend, connector) = run(backend, connector, request).await;

    assert_matches!(result, Err(JobError::Validation(_)));
    assert_eq!(backend.counters.readiness_waits.load(Ordering::SeqCst), 0);
    assert_eq!(backend.counters.submits.load(Ordering::SeqCst), 0);
    assert_eq!(connector.opens(), 0);
}

#[tokio::test]
async fn unreachable_backend_aborts_before_submission() {
    let mut backend = FakeBackend::ready_empty();
    backend.ready = false;
    let connector = ScriptedConnector::new(vec![]);

    let (result, backend, _) = run(backend, connector, request_with_images(0)).await;

    assert_matches!(result, Err(JobError::BackendUnavailable { attempts: 3 }));
    assert_eq!(
        backend.counters.submits.load(Ordering::SeqCst),
        0,
        "no submission after readiness exhaustion"
    );
}

#[tokio::test(start_paused = true)]
async fn stalled_readiness_wait_is_a_timeout_not_unavailable() {
    let mut backend = FakeBackend::ready_empty();
    backend.park_on_readiness = true;
    let connector = ScriptedConnector::new(vec![]);

    let (result, backend, _) = run(backend, connector, request_with_images(0)).await;

    assert_matches!(
        result,
        Err(JobError::Timeout {
            phase: "readiness",
            ..
        })
    );
    assert_eq!(backend.counters.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upload_failure_short_circuits_remaining_uploads() {
    let mut backend = FakeBackend::ready_empty();
    backend.fail_upload_at = Some(2);
    let connector = ScriptedConnector::new(vec![]);

    let (result, backend, _) = run(backend, connector, request_with_images(3)).await;

    assert_matches!(result, Err(JobError::InputUpload { .. }));
    assert_eq!(
        backend.counters.uploads.load(Ordering::SeqCst),
        2,
        "third upload must never be attempted"
    );
    assert_eq!(backend.counters.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn initial_stream_connect_failure_is_fatal() {
    let backend = FakeBackend::ready_empty();
    let connector = ScriptedConnector::new(vec![Err("refused".into())]);

    let (result, _, connector) = run(backend, connector, request_with_images(0)).await;

    assert_matches!(result, Err(JobError::StreamConnect { .. }));
    assert_eq!(connector.opens(), 1, "no reconnection before the first open");
}

#[tokio::test]
async fn one_disconnect_recovers_with_a_single_reconnect() {
    let backend = FakeBackend::ready_with_history(history_with_images(&["a.png"]));
    let connector = ScriptedConnector::new(vec![
        Ok(vec![Event::Drop]),
        Ok(vec![completion_frame()]),
    ]);

    let (result, _, connector) = run(backend, connector, request_with_images(0)).await;

    assert!(result.is_ok());
    // Initial open plus exactly one reconnect.
    assert_eq!(connector.opens(), 2);
}

#[tokio::test]
async fn repeated_disconnects_exhaust_reconnection() {
    let backend = FakeBackend::ready_empty();
    // Initial stream drops; both reconnect attempts (max 2) fail.
    let connector = ScriptedConnector::new(vec![
        Ok(vec![Event::Drop]),
        Err("still down".into()),
        Err("still down".into()),
    ]);

    let (result, backend, _) = run(backend, connector, request_with_images(0)).await;

    assert_matches!(result, Err(JobError::ReconnectExhausted { attempts: 2, .. }));
    assert_eq!(
        backend.counters.history_fetches.load(Ordering::SeqCst),
        0,
        "no collection after a fatal monitor outcome"
    );
}

#[tokio::test]
async fn execution_error_aborts_with_detail_preserved() {
    let backend = FakeBackend::ready_empty();
    let connector = ScriptedConnector::new(vec![Ok(vec![Event::Frame(
        serde_json::json!({
            "type": "execution_error",
            "data": {
                "prompt_id": PROMPT_ID,
                "node_id": "13",
                "exception_message": "CUDA out of memory",
                "exception_type": "RuntimeError",
            },
        })
        .to_string(),
    )])]);

    let (result, _, _) = run(backend, connector, request_with_images(0)).await;

    assert_matches!(result, Err(JobError::Execution { node_id, kind, message }) => {
        assert_eq!(node_id, "13");
        assert_eq!(kind, "RuntimeError");
        assert_eq!(message, "CUDA out of memory");
    });
}

#[tokio::test]
async fn missing_artifact_is_recorded_but_not_fatal() {
    let mut backend =
        FakeBackend::ready_with_history(history_with_images(&["a.png", "b.png", "c.png"]));
    backend.missing_artifacts = vec!["b.png".to_string()];
    let connector = ScriptedConnector::new(vec![Ok(vec![completion_frame()])]);

    let (result, backend, _) = run(backend, connector, request_with_images(0)).await;

    let result = result.expect("partial output still succeeds");
    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.artifacts.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("b.png"));
    assert_eq!(backend.counters.artifact_fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn result_serializes_to_wire_shape() {
    let backend = FakeBackend::ready_with_history(history_with_images(&["a.png"]));
    let connector = ScriptedConnector::new(vec![Ok(vec![completion_frame()])]);

    let (result, _, _) = run(backend, connector, request_with_images(0)).await;
    let json = serde_json::to_value(result.unwrap()).unwrap();

    assert_eq!(json["status"], "success");
    assert_eq!(json["prompt_id"], PROMPT_ID);
    assert_eq!(json["artifacts"][0]["filename"], "a.png");
    assert_eq!(json["artifacts"][0]["type"], "base64");
    assert!(json.get("errors").is_none(), "empty errors are omitted");
}
