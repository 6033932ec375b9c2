//! S3 (and S3-compatible) sink built on the AWS SDK.
//!
//! Credentials come from explicit config when provided, otherwise from the
//! SDK's default provider chain. A configured `endpoint_url` switches to
//! path-style addressing, which is what MinIO/R2-style endpoints expect.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;

use crate::sink::{ArtifactLocator, ArtifactSink, RelocatedArtifact, SinkError};

const DEFAULT_REGION: &str = "us-east-1";

/// Settings for the S3 sink.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

pub struct S3Sink {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3Sink {
    pub async fn new(config: S3Config) -> Self {
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()));

        if let (Some(key_id), Some(secret)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "storage-config",
            ));
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket,
            region,
            endpoint_url: config.endpoint_url,
        }
    }

    /// Public-style URL for an uploaded object. Custom endpoints get a
    /// path-style URL; plain AWS gets the virtual-hosted form.
    fn object_url(&self, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

#[async_trait]
impl ArtifactSink for S3Sink {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, bytes: &[u8], filename: &str) -> Result<RelocatedArtifact, SinkError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(filename)
            .content_type("image/png")
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| SinkError {
                sink: "s3",
                filename: filename.to_string(),
                detail: e.to_string(),
            })?;

        tracing::info!(bucket = %self.bucket, filename, "artifact uploaded to S3");
        Ok(RelocatedArtifact {
            filename: filename.to_string(),
            locator: ArtifactLocator::S3Url(self.object_url(filename)),
        })
    }
}
