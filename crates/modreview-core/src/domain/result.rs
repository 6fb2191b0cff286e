//! The worker's response to a review submission.

use serde::{Deserialize, Serialize};

/// Correction computed by the backend worker.
///
/// `similar_examples` is a fixed snapshot taken when the exchange resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    /// Original content of the task under review.
    #[serde(default)]
    pub text: String,
    pub original_classification: String,
    pub corrected_classification: String,
    /// Confidence in the corrected label, 0 to 1.
    pub updated_confidence: f64,
    pub learning_summary: String,
    #[serde(default)]
    pub similar_examples: Vec<String>,
}

impl ReviewResult {
    /// Whether the worker moved the item to a different label.
    pub fn classification_changed(&self) -> bool {
        self.original_classification != self.corrected_classification
    }

    /// Confidence as a whole percentage, for display.
    pub fn confidence_percent(&self) -> f64 {
        (self.updated_confidence * 100.0).round()
    }
}
