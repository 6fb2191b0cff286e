//! ModReview Transport: the duplex review channel
//!
//! One channel is opened per review exchange, authenticated with a bearer
//! credential at connect time, and discarded when the exchange ends.
//!
//! ## Layer 0 - Transport
//!
//! Focus: ordered delivery of inbound frames as typed events into a single
//! queue, idempotent close, and single-use channels.
//!
//! ## Key Components
//!
//! - `Connector`: opens channels (`open(endpoint, credential)`)
//! - `Channel`: `send` / `next_event` / `close` on one open connection
//! - `WsConnector`: WebSocket implementation (tokio-tungstenite)
//! - `fakes::MemoryConnector`: in-memory double for tests

pub mod channel_traits;
mod error;
pub mod fakes;
pub mod ws;

pub use channel_traits::{Channel, ChannelEvent, Connector};
pub use error::TransportError;
pub use ws::{endpoint_with_credential, WsChannel, WsConnector};

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;
