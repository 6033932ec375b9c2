//! Artifact relocation.
//!
//! Moves one artifact's raw bytes to exactly one configured destination and
//! returns a stable reference: a `gs://` URL (Google Cloud Storage), an
//! HTTP URL (S3 or S3-compatible endpoint), or the bytes inlined as base64
//! when no bucket is configured. The active sink is chosen once per
//! deployment by [`select::select_sink`].

pub mod gcs;
pub mod inline;
pub mod s3;
pub mod select;
pub mod sink;

pub use select::{select_sink, StorageConfig};
pub use sink::{ArtifactLocator, ArtifactSink, RelocatedArtifact, SinkError};
