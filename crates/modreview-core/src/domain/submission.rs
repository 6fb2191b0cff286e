//! Review submissions: the unit of work for one exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classification::ClassificationSet;
use super::error::ValidationError;

/// Confidence the reviewer asserts when none is given.
pub const DEFAULT_CONFIDENCE_SCORE: f64 = 1.0;

/// A reviewer's finalized classification and justification for one task.
///
/// Immutable once built; consumed by exactly one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    task_id: String,
    classification: String,
    justification: String,
    confidence_score: f64,
    created_at: DateTime<Utc>,
}

impl ReviewSubmission {
    /// Create a submission with the default confidence of 1.0.
    pub fn new(
        task_id: impl Into<String>,
        classification: impl Into<String>,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            classification: classification.into(),
            justification: justification.into(),
            confidence_score: DEFAULT_CONFIDENCE_SCORE,
            created_at: Utc::now(),
        }
    }

    /// Override the asserted confidence.
    pub fn with_confidence_score(mut self, score: f64) -> Self {
        self.confidence_score = score;
        self
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn classification(&self) -> &str {
        &self.classification
    }

    pub fn justification(&self) -> &str {
        &self.justification
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Check the submission against the configured labels.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule: empty task id, blank justification,
    /// unknown classification, then confidence outside `[0, 1]`.
    pub fn validate(&self, classifications: &ClassificationSet) -> Result<(), ValidationError> {
        if self.task_id.trim().is_empty() {
            return Err(ValidationError::EmptyTaskId);
        }
        if self.justification.trim().is_empty() {
            return Err(ValidationError::EmptyJustification);
        }
        if !classifications.contains(&self.classification) {
            return Err(ValidationError::UnknownClassification {
                value: self.classification.clone(),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(ValidationError::ConfidenceOutOfRange {
                value: self.confidence_score,
            });
        }
        Ok(())
    }
}
