//! Review submission exchange.
//!
//! Drives one submission from composing to a worker's correction:
//!
//! ```text
//! Idle -> Composing -> Connecting -> AwaitingAcknowledgement -> AwaitingResult -> Resolved
//!                          \________________\______________________\__________-> Failed
//! ```
//!
//! - `ExchangeController`: the caller-facing handle (`submit`, `retry`,
//!   `cancel`, `on_state_change`, ...)
//! - `ExchangeState`: the lifecycle, observed through handlers or `subscribe`
//! - `ExchangeError`: why an exchange failed or a call was refused

pub mod controller;
pub mod error;
mod machine;
pub mod state;

pub use controller::ExchangeController;
pub use error::{ExchangeError, ExchangeResult, WaitPhase};
pub use state::{ExchangeSnapshot, ExchangeState};
