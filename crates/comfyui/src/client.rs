//! WebSocket client for a ComfyUI server.
//!
//! [`ComfyClient`] holds the stream URL; [`ComfyClient::open`] performs the
//! handshake for one session, tagging the connection with the session's
//! `client_id` so ComfyUI addresses notifications back to that job.

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::monitor::{ConnectError, NotificationSource, StreamConnector, StreamDropped};

/// WebSocket connection factory for one ComfyUI server.
#[derive(Clone)]
pub struct ComfyClient {
    ws_url: String,
}

/// A live, single-owner notification stream for one session.
pub struct ComfyConnection {
    ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ComfyClient {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://127.0.0.1:8188`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// WebSocket base URL.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Perform the handshake for a session.
    ///
    /// A failed initial handshake is fatal for the job; reconnection only
    /// applies once a stream has been established.
    pub async fn open(&self, client_id: &str) -> Result<ComfyConnection, ConnectError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url)
            .await
            .map_err(|e| ConnectError(format!("handshake with {} failed: {e}", self.ws_url)))?;

        tracing::info!(client_id, url = %self.ws_url, "notification stream open");

        Ok(ComfyConnection { ws_stream })
    }
}

#[async_trait]
impl StreamConnector for ComfyClient {
    async fn open(&self, client_id: &str) -> Result<Box<dyn NotificationSource>, ConnectError> {
        let conn = ComfyClient::open(self, client_id).await?;
        Ok(Box::new(conn))
    }
}

#[async_trait]
impl NotificationSource for ComfyConnection {
    async fn next_frame(&mut self) -> Result<Option<String>, StreamDropped> {
        loop {
            match self.ws_stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Binary(_))) => {
                    // Preview image frames; irrelevant to completion tracking.
                    tracing::trace!("skipping binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "server closed notification stream");
                    return Ok(None);
                }
                Some(Err(e)) => return Err(StreamDropped(e.to_string())),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws_stream.close(None).await {
            tracing::debug!(error = %e, "stream close failed (already gone)");
        }
    }
}
