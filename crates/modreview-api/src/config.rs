//! REST client configuration.

use std::time::Duration;

use crate::error::ApiError;
use crate::ApiResult;

/// Default backend, matching a locally running server.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
const API_PATH_SUFFIX: &str = "/api/v1";
const REVIEWER_SOCKET_PATH: &str = "/ws/reviewer/";

/// Backend connection settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// REST root, e.g. `https://mod.example.com/api/v1`
    pub base_url: String,
    pub user_agent: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: std::env::var("MODREVIEW_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            user_agent: format!("modreview/{}", env!("CARGO_PKG_VERSION")),
            timeout: std::env::var("MODREVIEW_API_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30)),
        }
    }
}

impl ApiConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific backend
    pub fn new(base_url: &str) -> Self {
        ApiConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Reviewer socket URL served by the same backend.
    pub fn websocket_endpoint(&self) -> ApiResult<String> {
        websocket_endpoint(&self.base_url)
    }
}

/// Derive the reviewer socket URL from a REST base URL.
///
/// `https` maps to `wss` and `http` to `ws`; a trailing `/api/v1` is dropped.
pub fn websocket_endpoint(base_url: &str) -> ApiResult<String> {
    let base = base_url.trim().trim_end_matches('/');
    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| ApiError::InvalidBaseUrl(base_url.to_string()))?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "https" => "wss",
        "http" => "ws",
        _ => return Err(ApiError::InvalidBaseUrl(base_url.to_string())),
    };
    if rest.is_empty() {
        return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
    }
    let host = rest.strip_suffix(API_PATH_SUFFIX).unwrap_or(rest);
    Ok(format!("{ws_scheme}://{host}{REVIEWER_SOCKET_PATH}"))
}
