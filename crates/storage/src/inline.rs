//! Fallback sink: inline the artifact bytes as base64.
//!
//! Used when no object-storage bucket is configured. Infallible and
//! deterministic: identical bytes always produce the identical locator.

use async_trait::async_trait;
use base64::Engine as _;

use crate::sink::{ArtifactLocator, ArtifactSink, RelocatedArtifact, SinkError};

pub struct InlineSink;

#[async_trait]
impl ArtifactSink for InlineSink {
    fn kind(&self) -> &'static str {
        "inline"
    }

    async fn put(&self, bytes: &[u8], filename: &str) -> Result<RelocatedArtifact, SinkError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(RelocatedArtifact {
            filename: filename.to_string(),
            locator: ArtifactLocator::Base64(encoded),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encodes_bytes() {
        let artifact = InlineSink.put(b"hello", "a.png").await.unwrap();
        assert_eq!(artifact.filename, "a.png");
        assert_eq!(artifact.locator, ArtifactLocator::Base64("aGVsbG8=".into()));
    }

    #[tokio::test]
    async fn identical_input_yields_identical_locator() {
        let first = InlineSink.put(&[1, 2, 3], "a.png").await.unwrap();
        let second = InlineSink.put(&[1, 2, 3], "a.png").await.unwrap();
        assert_eq!(first.locator, second.locator);
    }
}
