//! Wire protocol for the reviewer socket.
//!
//! One outbound command and two inbound shapes, all JSON objects:
//!
//! - outbound `{"action": "submit_review", "task_id", "classification", "justification", "confidence_score"}`
//! - inbound acknowledgement: any object whose `celery_worker_id` is set
//!   (not null, `false`, `0` or `""`)
//! - inbound result: any object with `"action": "review_response"`
//!
//! The worker-id check runs first, so an object carrying a set worker id and
//! the action is an acknowledgement. An unset worker id is ignored. Every other shape is a [`ProtocolError`]; callers log it
//! and keep waiting.

use serde::Serialize;
use serde_json::Value;

use crate::domain::{ReviewResult, ReviewSubmission};

pub const SUBMIT_REVIEW_ACTION: &str = "submit_review";
pub const REVIEW_RESPONSE_ACTION: &str = "review_response";
pub const WORKER_ID_FIELD: &str = "celery_worker_id";

/// Inbound frames the protocol could not use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("review_response frame is malformed: {0}")]
    MalformedResult(String),

    #[error("unrecognized message shape with keys {keys:?}")]
    UnrecognizedShape { keys: Vec<String> },
}

/// A recognized inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The worker accepted the submission; advisory only.
    Acknowledgement { worker_id: String },
    /// The worker finished.
    Result(ReviewResult),
}

#[derive(Serialize)]
struct SubmitReview<'a> {
    action: &'static str,
    task_id: &'a str,
    classification: &'a str,
    justification: &'a str,
    confidence_score: f64,
}

/// Encode the outbound `submit_review` command.
pub fn encode_submission(submission: &ReviewSubmission) -> Value {
    let command = SubmitReview {
        action: SUBMIT_REVIEW_ACTION,
        task_id: submission.task_id(),
        classification: submission.classification(),
        justification: submission.justification(),
        confidence_score: submission.confidence_score(),
    };
    // Plain struct to Value: infallible.
    serde_json::to_value(command).unwrap_or(Value::Null)
}

/// A worker id that counts as set, stringified.
fn set_worker_id(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// Classify one inbound text frame.
pub fn decode_inbound(text: &str) -> Result<Inbound, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    if let Some(worker_id) = object.get(WORKER_ID_FIELD).and_then(set_worker_id) {
        return Ok(Inbound::Acknowledgement { worker_id });
    }

    if object.get("action").and_then(Value::as_str) == Some(REVIEW_RESPONSE_ACTION) {
        let result: ReviewResult = serde_json::from_value(value)
            .map_err(|e| ProtocolError::MalformedResult(e.to_string()))?;
        return Ok(Inbound::Result(result));
    }

    Err(ProtocolError::UnrecognizedShape {
        keys: object.keys().cloned().collect(),
    })
}
