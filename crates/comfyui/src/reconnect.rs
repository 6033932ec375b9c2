//! Bounded reconnection for a dropped notification stream.
//!
//! When the WebSocket drops mid-job the monitor calls [`reconnect`]: up to
//! `max_attempts` fresh handshakes to the same stream URL, sleeping a fixed
//! `delay` before each. The first success resumes listening; exhausting
//! every attempt is a terminal failure for the job. The initial handshake
//! of a session is never retried here -- a job that cannot connect at all
//! fails immediately.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::monitor::{NotificationSource, StreamConnector};

/// Reconnection bounds. Both knobs are deployment-configurable.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of handshake attempts after a drop.
    pub max_attempts: u32,
    /// Fixed sleep before each attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

/// Why reconnection gave up.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// All attempts failed; carries the final handshake error.
    #[error("failed to reconnect after {attempts} attempts; last error: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// The caller cancelled while reconnecting.
    #[error("reconnect cancelled")]
    Cancelled,
}

/// Try to re-establish the stream, respecting cancellation during both the
/// sleeps and the handshakes.
pub async fn reconnect(
    connector: &dyn StreamConnector,
    client_id: &str,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Result<Box<dyn NotificationSource>, ReconnectError> {
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=config.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return Err(ReconnectError::Cancelled),
            _ = tokio::time::sleep(config.delay) => {}
        }

        tracing::info!(
            client_id,
            attempt,
            max_attempts = config.max_attempts,
            "reconnecting notification stream",
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(ReconnectError::Cancelled),
            result = connector.open(client_id) => match result {
                Ok(stream) => {
                    tracing::info!(client_id, attempt, "reconnected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::warn!(client_id, attempt, error = %e, "reconnect attempt failed");
                    last_error = e.to_string();
                }
            }
        }
    }

    tracing::error!(
        client_id,
        attempts = config.max_attempts,
        "all reconnect attempts failed",
    );
    Err(ReconnectError::Exhausted {
        attempts: config.max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{ConnectError, StreamDropped};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NeverConnects {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl StreamConnector for NeverConnects {
        async fn open(
            &self,
            _client_id: &str,
        ) -> Result<Box<dyn NotificationSource>, ConnectError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ConnectError("connection refused".into()))
        }
    }

    struct SucceedsOnAttempt {
        succeed_on: u32,
        attempts: AtomicU32,
    }

    struct SilentStream;

    #[async_trait]
    impl NotificationSource for SilentStream {
        async fn next_frame(&mut self) -> Result<Option<String>, StreamDropped> {
            Ok(None)
        }
        async fn close(&mut self) {}
    }

    #[async_trait]
    impl StreamConnector for SucceedsOnAttempt {
        async fn open(
            &self,
            _client_id: &str,
        ) -> Result<Box<dyn NotificationSource>, ConnectError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt >= self.succeed_on {
                Ok(Box::new(SilentStream))
            } else {
                Err(ConnectError("still down".into()))
            }
        }
    }

    fn fast(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let connector = NeverConnects {
            attempts: AtomicU32::new(0),
        };
        let result = reconnect(&connector, "c", &fast(4), &CancellationToken::new()).await;
        assert_matches!(result, Err(ReconnectError::Exhausted { attempts: 4, last_error }) => {
            assert!(last_error.contains("connection refused"));
        });
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let connector = SucceedsOnAttempt {
            succeed_on: 3,
            attempts: AtomicU32::new(0),
        };
        let result = reconnect(&connector, "c", &fast(5), &CancellationToken::new()).await;
        assert!(result.is_ok());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_without_attempts() {
        let connector = NeverConnects {
            attempts: AtomicU32::new(0),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = reconnect(&connector, "c", &fast(5), &cancel).await;
        assert_matches!(result, Err(ReconnectError::Cancelled));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }
}
