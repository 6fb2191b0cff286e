//! Exchange configuration.

use std::time::Duration;

use crate::domain::ClassificationSet;

/// Default reviewer socket, matching a locally running backend.
pub const DEFAULT_WS_ENDPOINT: &str = "ws://localhost:8000/ws/reviewer/";
/// Bound on opening the channel.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on each waiting phase (acknowledgement, then result).
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
/// Unrecognized frames per exchange before a warning is raised.
pub const DEFAULT_PROTOCOL_WARN_THRESHOLD: u32 = 3;

/// Settings for one exchange controller.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Reviewer socket URL, without the credential.
    pub endpoint: String,
    /// Labels a submission may carry.
    pub classifications: ClassificationSet,
    pub connect_timeout: Duration,
    /// `None` waits indefinitely for the worker.
    pub response_timeout: Option<Duration>,
    pub protocol_warn_threshold: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            classifications: ClassificationSet::standard(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: Some(DEFAULT_RESPONSE_TIMEOUT),
            protocol_warn_threshold: DEFAULT_PROTOCOL_WARN_THRESHOLD,
        }
    }
}

fn env_secs(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl ExchangeConfig {
    /// Config for a specific socket endpoint, defaults elsewhere.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Read overrides from the environment.
    ///
    /// - `MODREVIEW_WS_URL`: socket endpoint
    /// - `MODREVIEW_CONNECT_TIMEOUT_SECS`
    /// - `MODREVIEW_RESPONSE_TIMEOUT_SECS`: `0` disables the bound
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("MODREVIEW_WS_URL") {
            config.endpoint = endpoint;
        }
        if let Some(secs) = env_secs("MODREVIEW_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = env_secs("MODREVIEW_RESPONSE_TIMEOUT_SECS") {
            config.response_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_classifications(mut self, classifications: ClassificationSet) -> Self {
        self.classifications = classifications;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_protocol_warn_threshold(mut self, threshold: u32) -> Self {
        self.protocol_warn_threshold = threshold.max(1);
        self
    }
}
