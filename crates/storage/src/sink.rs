//! The artifact sink contract and the relocation result types.

use async_trait::async_trait;
use serde::Serialize;

/// Where a relocated artifact ended up.
///
/// Serializes as the worker's wire shape: `{"type": "<kind>", "data": ...}`
/// alongside the filename, e.g.
/// `{"filename": "a.png", "type": "gcs_url", "data": "gs://bucket/a.png"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ArtifactLocator {
    /// `gs://bucket/key` reference.
    GcsUrl(String),
    /// HTTP(S) URL on S3 or an S3-compatible endpoint.
    S3Url(String),
    /// The artifact bytes themselves, base64-encoded.
    Base64(String),
}

/// One relocated output artifact -- the unit returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RelocatedArtifact {
    pub filename: String,
    #[serde(flatten)]
    pub locator: ArtifactLocator,
}

/// A sink rejected or failed to store an artifact.
///
/// Fatal to that artifact only; sibling artifacts continue.
#[derive(Debug, thiserror::Error)]
#[error("{sink} relocation of '{filename}' failed: {detail}")]
pub struct SinkError {
    /// Which sink failed (`gcs`, `s3`, `inline`).
    pub sink: &'static str,
    pub filename: String,
    pub detail: String,
}

/// Destination for output artifacts. One sink is active per deployment.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Short sink identifier, used in logs and errors.
    fn kind(&self) -> &'static str;

    /// Store `bytes` under `filename` and return the reference.
    async fn put(&self, bytes: &[u8], filename: &str) -> Result<RelocatedArtifact, SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_serializes_as_wire_shape() {
        let artifact = RelocatedArtifact {
            filename: "out.png".into(),
            locator: ArtifactLocator::GcsUrl("gs://bucket/out.png".into()),
        };
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["filename"], "out.png");
        assert_eq!(json["type"], "gcs_url");
        assert_eq!(json["data"], "gs://bucket/out.png");
    }

    #[test]
    fn inline_locator_tag() {
        let json = serde_json::to_value(ArtifactLocator::Base64("aGk=".into())).unwrap();
        assert_eq!(json["type"], "base64");
    }
}
