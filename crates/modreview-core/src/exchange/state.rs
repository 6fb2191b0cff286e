//! Exchange lifecycle states.

use std::fmt;

use crate::domain::{ReviewResult, ReviewSubmission};

use super::error::ExchangeError;

/// Where one review exchange currently is.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeState {
    /// No active exchange.
    Idle,
    /// Reviewer is editing; nothing on the wire.
    Composing,
    /// Channel is opening.
    Connecting,
    /// Submission sent; waiting for a worker to accept it.
    AwaitingAcknowledgement,
    /// Worker accepted; waiting for the correction.
    AwaitingResult,
    Resolved(ReviewResult),
    Failed(ExchangeError),
}

impl ExchangeState {
    pub fn name(&self) -> &'static str {
        match self {
            ExchangeState::Idle => "idle",
            ExchangeState::Composing => "composing",
            ExchangeState::Connecting => "connecting",
            ExchangeState::AwaitingAcknowledgement => "awaiting_acknowledgement",
            ExchangeState::AwaitingResult => "awaiting_result",
            ExchangeState::Resolved(_) => "resolved",
            ExchangeState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeState::Resolved(_) | ExchangeState::Failed(_))
    }

    /// A submission is on its way; new submissions are refused.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ExchangeState::Connecting
                | ExchangeState::AwaitingAcknowledgement
                | ExchangeState::AwaitingResult
        )
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeState::Resolved(result) => write!(
                f,
                "resolved ({} -> {})",
                result.original_classification, result.corrected_classification
            ),
            ExchangeState::Failed(err) => write!(f, "failed: {err}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Point-in-time view of an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeSnapshot {
    pub state: ExchangeState,
    /// Draft last submitted (or being retried).
    pub pending_submission: Option<ReviewSubmission>,
    pub last_result: Option<ReviewResult>,
}
