//! Per-job execution monitor.
//!
//! Tracks exactly one prompt to a terminal outcome over the per-client
//! WebSocket: `Connecting -> Listening -> {Completed | Failed |
//! Disconnected}`, where `Disconnected` re-enters `Connecting` through the
//! bounded reconnection protocol in [`crate::reconnect`].
//!
//! The monitor is written against two small seams, [`StreamConnector`] and
//! [`NotificationSource`], so the orchestrator can be tested with scripted
//! fake streams. The production implementations live in [`crate::client`].

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::messages::{parse_message, ComfyMessage};
use crate::reconnect::{reconnect, ReconnectConfig, ReconnectError};

/// The underlying connection dropped mid-read.
#[derive(Debug, thiserror::Error)]
#[error("stream dropped: {0}")]
pub struct StreamDropped(pub String);

/// A readable stream of notification text frames.
///
/// Single-owner: only the monitor for a given job reads from its source.
#[async_trait]
pub trait NotificationSource: Send {
    /// Next text frame. `Ok(None)` means the peer closed the stream
    /// cleanly; `Err` means it dropped. Non-text frames are skipped
    /// internally.
    async fn next_frame(&mut self) -> Result<Option<String>, StreamDropped>;

    /// Close the stream. Best-effort; errors are ignored.
    async fn close(&mut self);
}

impl std::fmt::Debug for dyn NotificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn NotificationSource")
    }
}

/// The initial WebSocket handshake failed.
#[derive(Debug, thiserror::Error)]
#[error("stream connect failed: {0}")]
pub struct ConnectError(pub String);

/// Opens notification streams for a session.
///
/// Reconnection re-dials the same URL (same `client_id`), so the connector
/// is reused across the whole job.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn open(&self, client_id: &str) -> Result<Box<dyn NotificationSource>, ConnectError>;
}

/// Terminal monitor outcomes other than completion.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// ComfyUI reported the prompt failed. Not retried.
    #[error("execution failed at node '{node_id}' ({kind}): {message}")]
    ExecutionFailed {
        node_id: String,
        kind: String,
        message: String,
    },

    /// The reconnection protocol ran out of attempts.
    #[error("reconnect exhausted after {attempts} attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },

    /// The overall monitoring budget elapsed without a terminal frame.
    #[error("no terminal notification within {budget:?}")]
    TimedOut { budget: Duration },

    /// The caller cancelled the job.
    #[error("monitoring cancelled")]
    Cancelled,
}

/// Read notifications until the prompt reaches a terminal state.
///
/// Success is the `executing` frame whose `node` is null and whose
/// `prompt_id` matches; `execution_error` for the prompt is a terminal
/// failure. Frames for other prompt ids sharing the stream are ignored.
/// A dropped connection triggers the bounded reconnection protocol; the
/// stream is closed on every exit path.
pub async fn wait_for_completion(
    mut stream: Box<dyn NotificationSource>,
    connector: &dyn StreamConnector,
    client_id: &str,
    prompt_id: &str,
    config: &ReconnectConfig,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<(), MonitorError> {
    let deadline = tokio::time::Instant::now() + budget;
    let outcome = listen(
        &mut stream,
        connector,
        client_id,
        prompt_id,
        config,
        deadline,
        budget,
        cancel,
    )
    .await;
    stream.close().await;
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn listen(
    stream: &mut Box<dyn NotificationSource>,
    connector: &dyn StreamConnector,
    client_id: &str,
    prompt_id: &str,
    config: &ReconnectConfig,
    deadline: tokio::time::Instant,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<(), MonitorError> {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(prompt_id, "monitoring cancelled");
                return Err(MonitorError::Cancelled);
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(prompt_id, ?budget, "monitoring budget elapsed");
                return Err(MonitorError::TimedOut { budget });
            }
            frame = stream.next_frame() => frame,
        };

        match frame {
            Ok(Some(text)) => {
                if let Some(outcome) = handle_frame(&text, prompt_id) {
                    return outcome;
                }
            }
            Ok(None) | Err(_) => {
                if let Err(ref e) = frame {
                    tracing::warn!(prompt_id, error = %e, "WebSocket dropped mid-job");
                } else {
                    tracing::warn!(prompt_id, "WebSocket closed mid-job");
                }
                // The budget keeps running while disconnected, so the
                // reconnect races the same deadline as the reads.
                let reconnected = tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        tracing::warn!(prompt_id, ?budget, "monitoring budget elapsed while reconnecting");
                        return Err(MonitorError::TimedOut { budget });
                    }
                    result = reconnect(connector, client_id, config, cancel) => result,
                };
                match reconnected {
                    Ok(new_stream) => {
                        // Frames sent while we were disconnected are not
                        // replayed. If the completion frame fell into the
                        // gap we keep listening until the budget elapses;
                        // a post-reconnect history poll would close this
                        // hole but the backend protocol gives no ordering
                        // guarantee to build it on.
                        *stream = new_stream;
                    }
                    Err(ReconnectError::Cancelled) => return Err(MonitorError::Cancelled),
                    Err(ReconnectError::Exhausted {
                        attempts,
                        last_error,
                    }) => {
                        return Err(MonitorError::ReconnectExhausted {
                            attempts,
                            last_error,
                        })
                    }
                }
            }
        }
    }
}

/// Interpret one text frame. `Some` is a terminal outcome for this prompt;
/// `None` keeps listening. Parse failures and unknown frame types are
/// logged and skipped for forward compatibility.
fn handle_frame(text: &str, prompt_id: &str) -> Option<Result<(), MonitorError>> {
    let msg = match parse_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, raw = %text, "skipping unparseable frame");
            return None;
        }
    };

    match msg {
        ComfyMessage::Executing(data) => {
            if data.prompt_id != prompt_id {
                // The per-client stream is not expected to multiplex, but
                // the protocol does not guarantee isolation.
                tracing::debug!(other = %data.prompt_id, "ignoring frame for another prompt");
                return None;
            }
            match data.node {
                Some(node) => {
                    tracing::debug!(prompt_id, node = %node, "executing node");
                    None
                }
                None => {
                    tracing::info!(prompt_id, "execution completed");
                    Some(Ok(()))
                }
            }
        }
        ComfyMessage::ExecutionError(data) => {
            if data.prompt_id != prompt_id {
                return None;
            }
            tracing::error!(
                prompt_id,
                node_id = %data.node_id,
                kind = %data.exception_type,
                message = %data.exception_message,
                "execution error",
            );
            Some(Err(MonitorError::ExecutionFailed {
                node_id: data.node_id,
                kind: data.exception_type,
                message: data.exception_message,
            }))
        }
        ComfyMessage::Progress(data) => {
            tracing::debug!(value = data.value, max = data.max, "generation progress");
            None
        }
        ComfyMessage::ExecutionStart(data) => {
            tracing::debug!(prompt_id = %data.prompt_id, "execution started");
            None
        }
        ComfyMessage::Executed(data) => {
            tracing::debug!(prompt_id = %data.prompt_id, node = %data.node, "node produced output");
            None
        }
        ComfyMessage::ExecutionCached(_) | ComfyMessage::Status(_) => None,
    }
}
