//! Sink selection by configuration precedence.

use std::sync::Arc;

use crate::gcs::{GcsSink, TokenSource};
use crate::inline::InlineSink;
use crate::s3::{S3Config, S3Sink};
use crate::sink::ArtifactSink;

/// Sink configuration as loaded from the environment.
///
/// At most one sink becomes active; see [`select_sink`].
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub gcs_bucket: Option<String>,
    pub gcs_access_token: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_endpoint_url: Option<String>,
    pub s3_region: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
}

/// Choose the deployment's sink. Precedence is fixed: a GCS bucket wins
/// over an S3 bucket, which wins over the inline-base64 fallback. With
/// both buckets configured the S3 one is never touched.
pub async fn select_sink(config: &StorageConfig, http: reqwest::Client) -> Arc<dyn ArtifactSink> {
    if let Some(bucket) = &config.gcs_bucket {
        let token = match &config.gcs_access_token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::Metadata,
        };
        tracing::info!(bucket = %bucket, "artifact sink: GCS");
        return Arc::new(GcsSink::new(http, bucket.clone(), token));
    }

    if let Some(bucket) = &config.s3_bucket {
        tracing::info!(bucket = %bucket, "artifact sink: S3");
        return Arc::new(
            S3Sink::new(S3Config {
                bucket: bucket.clone(),
                endpoint_url: config.s3_endpoint_url.clone(),
                region: config.s3_region.clone(),
                access_key_id: config.s3_access_key_id.clone(),
                secret_access_key: config.s3_secret_access_key.clone(),
            })
            .await,
        );
    }

    tracing::info!("artifact sink: inline base64 (no bucket configured)");
    Arc::new(InlineSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gcs_wins_over_s3_when_both_configured() {
        let config = StorageConfig {
            gcs_bucket: Some("gcs-bucket".into()),
            gcs_access_token: Some("token".into()),
            s3_bucket: Some("s3-bucket".into()),
            ..Default::default()
        };
        let sink = select_sink(&config, reqwest::Client::new()).await;
        assert_eq!(sink.kind(), "gcs");
    }

    #[tokio::test]
    async fn falls_back_to_inline_without_buckets() {
        let sink = select_sink(&StorageConfig::default(), reqwest::Client::new()).await;
        assert_eq!(sink.kind(), "inline");
    }
}
