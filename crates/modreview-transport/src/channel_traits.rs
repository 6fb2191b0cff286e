//! Channel trait definitions
//!
//! - `Connector`: establishes a channel for one exchange
//! - `Channel`: the open duplex connection
//!
//! Inbound traffic is surfaced as [`ChannelEvent`]s pulled from a single
//! queue in arrival order. `Error` and `Closed` are terminal: each is yielded
//! at most once and nothing follows them.

use async_trait::async_trait;

use crate::TransportResult;

/// An inbound event on an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One text frame, unparsed.
    Message(String),
    /// The connection failed. Terminal.
    Error(String),
    /// The peer closed the connection. Terminal.
    Closed { reason: Option<String> },
}

impl ChannelEvent {
    /// Whether this event ends the channel's lifetime.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Closed { .. })
    }
}

/// One open, single-use duplex connection.
///
/// Guarantees:
/// - `send` fails with `TransportError::NotOpen` once the channel is closed.
/// - `next_event` yields frames in arrival order, no batching or coalescing.
/// - `close` is idempotent.
#[async_trait]
pub trait Channel: Send {
    /// Transmit one JSON message as a single frame. No acknowledgement implied.
    async fn send(&mut self, message: &serde_json::Value) -> TransportResult<()>;

    /// Wait for the next inbound event. `None` once the event queue is exhausted.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Close the connection. Calling it again is a no-op.
    async fn close(&mut self) -> TransportResult<()>;

    /// Whether the channel is still open from the local side.
    fn is_open(&self) -> bool;
}

/// Opens review channels.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel to `endpoint`, authenticating with `credential`.
    ///
    /// Fails with `TransportError::InvalidEndpoint`, `Connection` or
    /// `Rejected` when the channel cannot be established.
    async fn open(&self, endpoint: &str, credential: &str) -> TransportResult<Box<dyn Channel>>;
}
