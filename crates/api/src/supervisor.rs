//! Backend process supervision and readiness gating.
//!
//! The bridge can run next to an externally managed ComfyUI, or launch one
//! itself when `COMFY_LAUNCH_CMD` is set. Either way the supervisor owns
//! the startup story: poll until the backend answers, flip the readiness
//! flag, and keep watching a launched process so an exit takes the flag
//! back down instead of leaving jobs to fail one by one.

use std::sync::Arc;
use std::time::Duration;

use comfybridge_comfyui::api::ComfyApi;
use tokio::process::{Child, Command};
use tokio::sync::watch;

pub struct Supervisor {
    ready: watch::Receiver<bool>,
}

impl Supervisor {
    /// Launch (optionally) and watch the backend on a background task.
    ///
    /// Readiness starts `false` and flips once the backend answers a
    /// probe; job-serving handlers refuse work until then.
    pub fn start(
        api: ComfyApi,
        launch_cmd: Option<String>,
        max_attempts: u32,
        interval: Duration,
    ) -> Arc<Self> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(run(api, launch_cmd, max_attempts, interval, tx));
        Arc::new(Self { ready: rx })
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }
}

async fn run(
    api: ComfyApi,
    launch_cmd: Option<String>,
    max_attempts: u32,
    interval: Duration,
    ready: watch::Sender<bool>,
) {
    let mut child = match spawn_backend(launch_cmd.as_deref()) {
        Ok(child) => child,
        Err(e) => {
            // The backend may still be managed externally; keep probing.
            tracing::error!(error = %e, "failed to launch backend process");
            None
        }
    };

    if !api.wait_until_ready(max_attempts, interval).await {
        tracing::error!(
            url = api.api_url(),
            "backend never became reachable; refusing jobs"
        );
        if let Some(child) = child.as_mut() {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to kill unresponsive backend");
            }
        }
        return;
    }

    tracing::info!(url = api.api_url(), "backend ready; accepting jobs");
    let _ = ready.send(true);

    // For a launched backend, an exit means no job can succeed anymore.
    if let Some(mut child) = child {
        match child.wait().await {
            Ok(status) => tracing::error!(%status, "backend process exited"),
            Err(e) => tracing::error!(error = %e, "backend process wait failed"),
        }
        let _ = ready.send(false);
    }
}

fn spawn_backend(launch_cmd: Option<&str>) -> std::io::Result<Option<Child>> {
    let Some(launch_cmd) = launch_cmd else {
        return Ok(None);
    };
    let mut parts = launch_cmd.split_whitespace();
    let Some(program) = parts.next() else {
        return Ok(None);
    };
    let child = Command::new(program).args(parts).spawn()?;
    tracing::info!(program, "launched backend process");
    Ok(Some(child))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_not_ready() {
        // Nothing listens on this port; the flag must stay down.
        let api = ComfyApi::new("http://127.0.0.1:1".to_string());
        let supervisor = Supervisor::start(api, None, 1, Duration::from_millis(1));
        assert!(!supervisor.is_ready());
    }

    #[test]
    fn empty_launch_cmd_spawns_nothing() {
        assert!(spawn_backend(Some("   ")).unwrap().is_none());
        assert!(spawn_backend(None).unwrap().is_none());
    }
}
