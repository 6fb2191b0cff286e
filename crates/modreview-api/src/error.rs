//! Error types for the REST client

use modreview_core::SessionError;
use thiserror::Error;

/// Errors returned by [`crate::ApiClient`].
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure (DNS, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success status from the backend
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Credentials were rejected and could not be refreshed
    #[error("session expired, log in again")]
    Unauthorized,

    /// The account has two-factor auth enabled and no code was given
    #[error("two-factor code required")]
    OtpRequired,

    /// Base URL cannot be turned into a reviewer socket URL
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// A success response without the expected payload
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Token store failure
    #[error("session store error: {0}")]
    Session(#[from] SessionError),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Http(err.to_string())
    }
}

impl ApiError {
    /// Whether the caller has to log in again.
    pub fn needs_login(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::OtpRequired)
    }
}
