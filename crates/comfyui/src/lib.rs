//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed notification parsing, the HTTP API wrappers used by the
//! job orchestrator (readiness probe, image upload, workflow submission,
//! history and artifact retrieval), the per-job WebSocket client, and the
//! completion monitor with bounded reconnection.

pub mod api;
pub mod client;
pub mod messages;
pub mod monitor;
pub mod reconnect;
