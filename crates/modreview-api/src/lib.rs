//! ModReview API: REST client for the moderation backend
//!
//! ## Layer 2 - Backend access
//!
//! - `ApiClient`: bearer-authenticated requests with one refresh-and-retry on `401`
//! - account: login (with optional TOTP code), token refresh, 2FA setup
//! - tasks: review queues, assignment, review completion
//! - `websocket_endpoint`: the reviewer socket URL for a REST base URL

mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
mod tasks;

pub use client::ApiClient;
pub use config::{websocket_endpoint, ApiConfig, DEFAULT_API_URL};
pub use error::ApiError;
pub use models::{
    ApiReply, ChangePassword, Envelope, LoginResponse, ReviewTask, StatusMessage, SubmittedTask,
    TwoFactorSetup,
};

/// Result type for API operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;
