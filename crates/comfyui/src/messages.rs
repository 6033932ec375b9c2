//! ComfyUI WebSocket notification types and parser.
//!
//! ComfyUI pushes JSON frames of the shape `{"type": "<kind>", "data": {...}}`
//! over the per-client WebSocket. This module deserializes them into a typed
//! [`ComfyMessage`]. Unknown `type` values and malformed frames parse to
//! `Err`; the monitor logs and skips those so that protocol additions on the
//! ComfyUI side never break an in-flight job.

use serde::Deserialize;

/// All ComfyUI notification frames the bridge understands.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyMessage {
    /// Server status broadcast (queue depth).
    #[serde(rename = "status")]
    Status(StatusData),

    /// A queued prompt has started executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(ExecutionStartData),

    /// Nodes skipped because their outputs were cached.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A node is executing. `node == None` signals that the whole prompt
    /// has finished -- this is the only success signal the protocol has.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step-level progress inside a long-running node.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// The prompt failed.
    #[serde(rename = "execution_error")]
    ExecutionError(ExecutionErrorData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStartData {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Payload for `executing` frames. `node == None` means the prompt is done.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step.
    pub value: i32,
    /// Total steps.
    pub max: i32,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    /// Raw node output (image refs, filenames, ...).
    pub output: serde_json::Value,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

/// Parse one WebSocket text frame into a [`ComfyMessage`].
///
/// Returns `Err` for malformed JSON or an unrecognized `type`.
pub fn parse_message(text: &str) -> Result<ComfyMessage, serde_json::Error> {
    serde_json::from_str(text)
}
