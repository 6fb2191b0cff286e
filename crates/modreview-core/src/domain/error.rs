//! Local validation failures for review submissions.

use serde::Serialize;

/// Why a submission was rejected before any network activity.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("task id must not be empty")]
    EmptyTaskId,

    #[error("justification must not be empty")]
    EmptyJustification,

    #[error("classification {value:?} is not one of the configured labels")]
    UnknownClassification { value: String },

    #[error("confidence score {value} is outside [0, 1]")]
    ConfidenceOutOfRange { value: f64 },
}
