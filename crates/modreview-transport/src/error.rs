//! Error types for modreview-transport

use thiserror::Error;

/// Errors that can occur while opening or using a review channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint could not be turned into a connect request
    #[error("Malformed endpoint: {0}")]
    InvalidEndpoint(String),

    /// Network, TLS or handshake failure while opening
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Server refused the handshake (e.g. bad credential)
    #[error("Connection rejected with HTTP status {status}")]
    Rejected { status: u16 },

    /// Send attempted on a channel that is not open
    #[error("Channel is not open")]
    NotOpen,

    /// Frame could not be written
    #[error("Send failed: {0}")]
    Send(String),

    /// Outbound message could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Serialization(err.to_string())
    }
}
