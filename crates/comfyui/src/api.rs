//! REST client for the ComfyUI HTTP endpoints.
//!
//! Wraps every request/response interaction the orchestrator needs:
//! reachability probing, readiness polling, input image upload, workflow
//! submission, execution-history retrieval, and output artifact download.
//! The client carries no retry policy of its own beyond what each operation
//! documents.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine as _;
use serde::Deserialize;

/// Timeout for the reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for uploads and workflow submission.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for artifact downloads (can be multi-megabyte images).
const VIEW_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for a single ComfyUI server.
///
/// Cheap to clone; the inner [`reqwest::Client`] is a shared connection
/// pool and is safe for concurrent use by multiple job tasks.
#[derive(Clone)]
pub struct ComfyApi {
    client: reqwest::Client,
    api_url: String,
}

/// Reachability record returned by [`ComfyApi::server_status`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServerStatus {
    /// Whether the server answered the probe with a 2xx.
    pub reachable: bool,
    /// HTTP status code, when a response was received at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Transport error detail, when the probe could not complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One history entry: the outputs a finished prompt produced, keyed by the
/// node that produced them. `BTreeMap` keeps artifact collection order
/// deterministic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
}

/// Outputs of a single workflow node. Only image outputs are collected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ArtifactRef>,
}

/// Reference to one fetchable output file; not the bytes themselves.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// ComfyUI file category (`output`, `temp`, ...). `type` on the wire.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "output".to_string()
}

/// Errors from the ComfyUI REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyApiError {
    /// The HTTP request itself failed (network, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// An input image payload was not valid base64 / data URI.
    #[error("invalid payload for input '{name}': {detail}")]
    InvalidPayload { name: String, detail: String },

    /// An input image upload was rejected.
    #[error("upload of '{name}' failed (HTTP {status}): {body}")]
    Upload {
        name: String,
        status: u16,
        body: String,
    },

    /// `/prompt` answered 2xx but without a prompt id.
    #[error("workflow submission returned no prompt_id")]
    MissingPromptId,

    /// `/history` answered 2xx but the prompt id is absent from the body.
    #[error("execution history for prompt {prompt_id} not found")]
    HistoryNotFound { prompt_id: String },
}

impl ComfyApi {
    /// Create a client for a ComfyUI server.
    ///
    /// * `api_url` - base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`] pool.
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Base HTTP URL of the server.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Probe the server root with a bounded timeout.
    ///
    /// Never fails: transport errors and non-2xx responses both come back
    /// as an unreachable [`ServerStatus`].
    pub async fn server_status(&self) -> ServerStatus {
        let result = self
            .client
            .get(format!("{}/", self.api_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) => ServerStatus {
                reachable: response.status().is_success(),
                code: Some(response.status().as_u16()),
                error: None,
            },
            Err(e) => ServerStatus {
                reachable: false,
                code: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Poll [`server_status`](Self::server_status) until the server is
    /// reachable, up to `max_attempts` probes with `interval` sleeps in
    /// between. Returns `false` (not an error) when the server never came
    /// up; the caller decides whether that is fatal.
    pub async fn wait_until_ready(&self, max_attempts: u32, interval: Duration) -> bool {
        for attempt in 1..=max_attempts {
            if self.server_status().await.reachable {
                tracing::debug!(attempt, "ComfyUI is reachable");
                return true;
            }
            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }
        tracing::warn!(max_attempts, "ComfyUI never became reachable");
        false
    }

    /// Upload one input image via `POST /upload/image`.
    ///
    /// `payload` is a base64 string, optionally prefixed as a data URI
    /// (`data:image/png;base64,...`). Decoding happens here so a bad
    /// payload is attributed to the offending asset. Existing files with
    /// the same name are overwritten, matching fresh-input semantics.
    pub async fn upload_image(&self, name: &str, payload: &str) -> Result<(), ComfyApiError> {
        let bytes = decode_image_payload(payload).map_err(|detail| {
            ComfyApiError::InvalidPayload {
                name: name.to_string(),
                detail,
            }
        })?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = read_body(response).await;
            return Err(ComfyApiError::Upload {
                name: name.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(name, "uploaded input image");
        Ok(())
    }

    /// Queue a workflow via `POST /prompt`, correlated to a WebSocket
    /// client via `client_id`. Returns the server-assigned prompt id.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<String, ComfyApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        submitted.prompt_id.ok_or(ComfyApiError::MissingPromptId)
    }

    /// Retrieve execution history for a prompt via `GET /history/{id}`.
    ///
    /// A 2xx body that does not contain the prompt id yields the distinct
    /// [`ComfyApiError::HistoryNotFound`], so callers can tell "history
    /// endpoint broken" from "this prompt left no history".
    pub async fn get_history(&self, prompt_id: &str) -> Result<HistoryEntry, ComfyApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await?;

        let mut history: BTreeMap<String, HistoryEntry> = Self::parse_response(response).await?;
        history
            .remove(prompt_id)
            .ok_or_else(|| ComfyApiError::HistoryNotFound {
                prompt_id: prompt_id.to_string(),
            })
    }

    /// Download one output artifact via `GET /view`.
    ///
    /// Best-effort: any failure (transport or non-2xx) is logged and
    /// returns `None`, since one missing artifact must not abort
    /// collection of its siblings.
    pub async fn get_artifact(&self, artifact: &ArtifactRef) -> Option<Vec<u8>> {
        let mut query = vec![
            ("filename", artifact.filename.as_str()),
            ("type", artifact.kind.as_str()),
        ];
        if !artifact.subfolder.is_empty() {
            query.push(("subfolder", artifact.subfolder.as_str()));
        }

        let result = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&query)
            .timeout(VIEW_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(bytes) => Some(bytes.to_vec()),
                Err(e) => {
                    tracing::warn!(filename = %artifact.filename, error = %e, "artifact body read failed");
                    None
                }
            },
            Ok(response) => {
                tracing::warn!(
                    filename = %artifact.filename,
                    status = response.status().as_u16(),
                    "artifact fetch rejected",
                );
                None
            }
            Err(e) => {
                tracing::warn!(filename = %artifact.filename, error = %e, "artifact fetch failed");
                None
            }
        }
    }

    /// Fetch the node/model catalog via `GET /object_info` (served as the
    /// bridge's `/models` passthrough).
    pub async fn get_object_info(&self) -> Result<serde_json::Value, ComfyApiError> {
        let response = self
            .client
            .get(format!("{}/object_info", self.api_url))
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Parse a JSON response, turning non-2xx statuses into
    /// [`ComfyApiError::Api`] with the raw body preserved for debugging.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = read_body(response).await;
            return Err(ComfyApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    prompt_id: Option<String>,
}

async fn read_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string())
}

/// Decode a base64 image payload, stripping a `data:...;base64,` prefix
/// when present.
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, String> {
    let encoded = match payload.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_plain_base64() {
        let decoded = decode_image_payload("aGVsbG8=").unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn decode_data_uri() {
        let decoded = decode_image_payload("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_image_payload("!!not base64!!").is_err());
    }

    #[test]
    fn artifact_ref_defaults_kind_and_subfolder() {
        let parsed: ArtifactRef = serde_json::from_str(r#"{"filename":"a.png"}"#).unwrap();
        assert_eq!(parsed.kind, "output");
        assert!(parsed.subfolder.is_empty());
    }

    #[test]
    fn history_entry_parses_comfyui_shape() {
        let json = r#"{
            "outputs": {
                "9": {"images": [{"filename":"a.png","subfolder":"s","type":"output"}]},
                "12": {"gifs": []}
            }
        }"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.outputs.len(), 2);
        assert_eq!(entry.outputs["9"].images.len(), 1);
        assert!(entry.outputs["12"].images.is_empty());
    }
}
