//! Job request and result types.

use comfybridge_storage::RelocatedArtifact;
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// An incoming generation job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    /// The ComfyUI workflow graph, passed through unmodified. The
    /// orchestrator only requires it to be a JSON object; its contents
    /// are backend-defined.
    pub workflow: serde_json::Value,

    /// Input images to stage on the backend before submission.
    #[serde(default)]
    pub images: Vec<InputImage>,
}

/// One input image: a filename plus a base64 (or data URI) payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InputImage {
    pub name: String,
    pub image: String,
}

/// Terminal job status. A job that aborts mid-pipeline surfaces as a
/// [`JobError`] instead of a result, so a returned `JobResult` is always
/// `Success` -- possibly with per-artifact `errors` attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Error,
}

/// The consolidated outcome of one job.
#[derive(Debug, Serialize)]
pub struct JobResult {
    pub status: JobStatus,
    pub prompt_id: String,
    /// Relocated output artifacts, in history order.
    pub artifacts: Vec<RelocatedArtifact>,
    /// Non-fatal per-artifact failures (fetch misses, sink rejections).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Check request shape before any network traffic.
///
/// Pure and idempotent: the same input always yields the same outcome.
pub fn validate(request: &JobRequest) -> Result<(), JobError> {
    if !request.workflow.is_object() {
        return Err(JobError::Validation(
            "'workflow' must be a JSON object".to_string(),
        ));
    }

    for (index, image) in request.images.iter().enumerate() {
        if image.name.is_empty() {
            return Err(JobError::Validation(format!(
                "image {index} is missing a 'name'"
            )));
        }
        if image.image.is_empty() {
            return Err(JobError::Validation(format!(
                "image '{}' has an empty payload",
                image.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request(workflow: serde_json::Value) -> JobRequest {
        JobRequest {
            workflow,
            images: vec![],
        }
    }

    #[test]
    fn accepts_object_workflow() {
        assert!(validate(&request(serde_json::json!({"1": {"class_type": "KSampler"}}))).is_ok());
    }

    #[test]
    fn rejects_non_object_workflow() {
        assert_matches!(
            validate(&request(serde_json::json!("not a graph"))),
            Err(JobError::Validation(_))
        );
        assert_matches!(
            validate(&request(serde_json::Value::Null)),
            Err(JobError::Validation(_))
        );
    }

    #[test]
    fn rejects_image_without_name_or_payload() {
        let mut req = request(serde_json::json!({}));
        req.images.push(InputImage {
            name: String::new(),
            image: "aGk=".into(),
        });
        assert_matches!(validate(&req), Err(JobError::Validation(_)));

        req.images[0] = InputImage {
            name: "input.png".into(),
            image: String::new(),
        };
        assert_matches!(validate(&req), Err(JobError::Validation(_)));
    }

    #[test]
    fn validation_is_idempotent() {
        let req = request(serde_json::json!({"1": {}}));
        let first = validate(&req).is_ok();
        let second = validate(&req).is_ok();
        assert_eq!(first, second);
    }
}
