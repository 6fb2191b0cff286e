//! HTTP plumbing shared by every endpoint.

use modreview_core::Session;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::ApiResult;

const MAX_ERROR_BODY: usize = 200;

/// Client for the moderation backend's REST API.
///
/// Every request carries the session's access token as a bearer credential.
/// A `401` triggers one token refresh and one retry; when that fails too the
/// session is cleared and [`ApiError::Unauthorized`] is returned.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    session: Session,
}

impl ApiClient {
    /// Create a new client
    pub fn new(config: ApiConfig, session: Session) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;
        Ok(ApiClient {
            http,
            config,
            session,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Reviewer socket URL for this backend.
    pub fn websocket_endpoint(&self) -> ApiResult<String> {
        self.config.websocket_endpoint()
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.send_authorized(Method::GET, path, None).await?;
        decode(response).await
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let response = self.send_authorized(Method::POST, path, Some(&body)).await?;
        decode(response).await
    }

    /// POST without credentials or refresh handling (login, token refresh).
    pub(crate) async fn post_anonymous<B>(&self, path: &str, body: &B) -> ApiResult<Response>
    where
        B: Serialize + ?Sized,
    {
        Ok(self
            .http
            .post(self.config.url(path))
            .json(body)
            .send()
            .await?)
    }

    async fn send_authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ApiResult<Response> {
        let response = self.send_once(method.clone(), path, body).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path, "access token rejected, refreshing");
        if let Err(err) = self.refresh().await {
            warn!(path, error = %err, "token refresh failed, clearing session");
            self.session.tokens().clear().await?;
            return Err(ApiError::Unauthorized);
        }

        let retried = self.send_once(method, path, body).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(path, "refreshed token rejected, clearing session");
            self.session.tokens().clear().await?;
            return Err(ApiError::Unauthorized);
        }
        Ok(retried)
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ApiResult<Response> {
        let mut request = self.http.request(method, self.config.url(path));
        if let Some(token) = self.session.access_token().await? {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

/// Turn a response into `T`, or into [`ApiError::Status`] on a non-2xx code.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Best human-readable message in an error body.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "detail", "message"] {
            if let Some(Value::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
