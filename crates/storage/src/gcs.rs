//! Google Cloud Storage sink.
//!
//! Uploads through the JSON API (`uploadType=media`) over the shared
//! reqwest pool. The bearer token comes from `GCS_ACCESS_TOKEN` when set,
//! otherwise from the GCE/Cloud Run metadata server, which is how the
//! worker authenticates when running with an attached service account.

use async_trait::async_trait;
use serde::Deserialize;

use crate::sink::{ArtifactLocator, ArtifactSink, RelocatedArtifact, SinkError};

const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// How the sink obtains its bearer token.
pub enum TokenSource {
    /// Fixed token from configuration.
    Static(String),
    /// Fetch from the instance metadata server per upload.
    Metadata,
}

pub struct GcsSink {
    http: reqwest::Client,
    bucket: String,
    token: TokenSource,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

impl GcsSink {
    pub fn new(http: reqwest::Client, bucket: String, token: TokenSource) -> Self {
        Self {
            http,
            bucket,
            token,
        }
    }

    async fn bearer_token(&self, filename: &str) -> Result<String, SinkError> {
        match &self.token {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata => {
                let response = self
                    .http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| self.error(filename, format!("metadata token fetch: {e}")))?;

                if !response.status().is_success() {
                    return Err(self.error(
                        filename,
                        format!("metadata token fetch: HTTP {}", response.status().as_u16()),
                    ));
                }

                let token: MetadataToken = response
                    .json()
                    .await
                    .map_err(|e| self.error(filename, format!("metadata token parse: {e}")))?;
                Ok(token.access_token)
            }
        }
    }

    fn error(&self, filename: &str, detail: String) -> SinkError {
        SinkError {
            sink: "gcs",
            filename: filename.to_string(),
            detail,
        }
    }
}

#[async_trait]
impl ArtifactSink for GcsSink {
    fn kind(&self) -> &'static str {
        "gcs"
    }

    async fn put(&self, bytes: &[u8], filename: &str) -> Result<RelocatedArtifact, SinkError> {
        let token = self.bearer_token(filename).await?;

        let url = format!(
            "{UPLOAD_BASE}/b/{}/o?uploadType=media&name={}",
            self.bucket, filename,
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.error(filename, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(filename, format!("HTTP {}: {body}", status.as_u16())));
        }

        tracing::info!(bucket = %self.bucket, filename, "artifact uploaded to GCS");
        Ok(RelocatedArtifact {
            filename: filename.to_string(),
            locator: ArtifactLocator::GcsUrl(format!("gs://{}/{}", self.bucket, filename)),
        })
    }
}
