//! Error taxonomy for the review exchange.

use std::time::Duration;

use crate::domain::ValidationError;
use crate::protocol::ProtocolError;

/// Which wait timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    Acknowledgement,
    Result,
}

impl std::fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitPhase::Acknowledgement => f.write_str("acknowledgement"),
            WaitPhase::Result => f.write_str("result"),
        }
    }
}

/// Errors produced by the exchange controller.
///
/// Carried inside `ExchangeState::Failed`, hence `Clone + PartialEq`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExchangeError {
    #[error("invalid submission: {0}")]
    Validation(#[from] ValidationError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("no {phase} from worker within {after:?}")]
    Timeout { phase: WaitPhase, after: Duration },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("exchange task has shut down")]
    Shutdown,
}

impl ExchangeError {
    /// Failures the reviewer can recover from with `retry()`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Connection(_) | ExchangeError::Timeout { .. }
        )
    }
}

impl From<modreview_transport::TransportError> for ExchangeError {
    fn from(err: modreview_transport::TransportError) -> Self {
        ExchangeError::Connection(err.to_string())
    }
}

/// Result type for exchange operations.
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;
