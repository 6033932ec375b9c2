//! Environment-driven server configuration.
//!
//! | Variable                          | Default          | Meaning                                   |
//! |-----------------------------------|------------------|-------------------------------------------|
//! | `HOST`                            | `0.0.0.0`        | Bind address                              |
//! | `PORT`                            | `8080`           | Bind port                                 |
//! | `COMFY_HOST`                      | `127.0.0.1:8188` | ComfyUI host:port (HTTP and WebSocket)    |
//! | `COMFY_LAUNCH_CMD`                | unset            | Command to launch ComfyUI, if supervised  |
//! | `COMFY_API_AVAILABLE_MAX_RETRIES` | `500`            | Per-job readiness probes                  |
//! | `COMFY_API_AVAILABLE_INTERVAL_MS` | `50`             | Delay between readiness probes            |
//! | `WEBSOCKET_RECONNECT_ATTEMPTS`    | `5`              | Stream reconnect attempts per gap         |
//! | `WEBSOCKET_RECONNECT_DELAY_S`     | `3`              | Delay before each reconnect attempt       |
//! | `JOB_TIMEOUT_SECS`                | `600`            | Wall-clock budget for one job's execution |
//! | `REQUEST_TIMEOUT_SECS`            | `660`            | HTTP-layer request timeout                |
//! | `GCS_BUCKET_NAME` / `GCS_ACCESS_TOKEN` | unset       | GCS artifact sink                         |
//! | `S3_BUCKET_NAME` / `S3_ENDPOINT_URL` / `S3_REGION` / `S3_ACCESS_KEY_ID` / `S3_SECRET_ACCESS_KEY` | unset | S3 artifact sink |
//!
//! With no bucket configured, artifacts come back inline as base64.

use std::str::FromStr;
use std::time::Duration;

use comfybridge_comfyui::reconnect::ReconnectConfig;
use comfybridge_orchestrator::OrchestratorConfig;
use comfybridge_storage::StorageConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// ComfyUI `host:port`, without a scheme.
    pub comfy_host: String,
    pub launch_cmd: Option<String>,
    pub readiness_max_attempts: u32,
    pub readiness_interval: Duration,
    pub reconnect: ReconnectConfig,
    pub job_timeout: Duration,
    pub request_timeout: Duration,
    pub storage: StorageConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: opt_var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var("PORT", 8080)?,
            comfy_host: opt_var("COMFY_HOST").unwrap_or_else(|| "127.0.0.1:8188".to_string()),
            launch_cmd: opt_var("COMFY_LAUNCH_CMD"),
            readiness_max_attempts: parse_var("COMFY_API_AVAILABLE_MAX_RETRIES", 500)?,
            readiness_interval: Duration::from_millis(parse_var(
                "COMFY_API_AVAILABLE_INTERVAL_MS",
                50,
            )?),
            reconnect: ReconnectConfig {
                max_attempts: parse_var("WEBSOCKET_RECONNECT_ATTEMPTS", 5)?,
                delay: Duration::from_secs(parse_var("WEBSOCKET_RECONNECT_DELAY_S", 3)?),
            },
            job_timeout: Duration::from_secs(parse_var("JOB_TIMEOUT_SECS", 600)?),
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 660)?),
            storage: StorageConfig {
                gcs_bucket: opt_var("GCS_BUCKET_NAME"),
                gcs_access_token: opt_var("GCS_ACCESS_TOKEN"),
                s3_bucket: opt_var("S3_BUCKET_NAME"),
                s3_endpoint_url: opt_var("S3_ENDPOINT_URL"),
                s3_region: opt_var("S3_REGION"),
                s3_access_key_id: opt_var("S3_ACCESS_KEY_ID"),
                s3_secret_access_key: opt_var("S3_SECRET_ACCESS_KEY"),
            },
        })
    }

    /// HTTP base URL of the ComfyUI server.
    pub fn api_url(&self) -> String {
        format!("http://{}", self.comfy_host)
    }

    /// WebSocket base URL of the ComfyUI server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.comfy_host)
    }

    /// Lifecycle tuning derived from this configuration.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            readiness_max_attempts: self.readiness_max_attempts,
            readiness_interval: self.readiness_interval,
            reconnect: self.reconnect.clone(),
            job_timeout: self.job_timeout,
            ..OrchestratorConfig::default()
        }
    }
}

fn opt_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}
