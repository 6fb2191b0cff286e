//! ModReview Core Library
//!
//! The client side of the review submission exchange: a reviewer's
//! classification and justification go out over a per-exchange channel and
//! a backend worker's correction comes back.
//!
//! ## Layer 1 - Core
//!
//! - `domain`: submissions, results, the classification enumeration
//! - `protocol`: JSON wire codec for the reviewer socket
//! - `session`: explicitly passed session context and token storage
//! - `exchange`: the exchange state machine and its controller
//! - `obs` / `metrics` / `telemetry`: tracing and counters

pub mod config;
pub mod domain;
pub mod exchange;
pub mod metrics;
pub mod obs;
pub mod protocol;
pub mod session;
pub mod telemetry;

pub use config::ExchangeConfig;
pub use domain::{
    ClassificationOption, ClassificationSet, ReviewResult, ReviewSubmission, ValidationError,
};
pub use exchange::{
    ExchangeController, ExchangeError, ExchangeResult, ExchangeSnapshot, ExchangeState, WaitPhase,
};
pub use protocol::{decode_inbound, encode_submission, Inbound, ProtocolError};
pub use session::{
    FileTokenStore, MemoryTokenStore, Role, Session, SessionError, SessionResult, TokenStore,
    UserProfile,
};
pub use telemetry::init_tracing;

/// Crate version, for the CLI banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
