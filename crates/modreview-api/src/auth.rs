//! Account endpoints: login, token refresh, two-factor auth, profile changes.

use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::client::{decode, error_message, ApiClient};
use crate::error::ApiError;
use crate::models::{
    two_factor_verified, ApiReply, ChangePassword, Envelope, LoginRequest, LoginResponse,
    TokenRefresh, TwoFactorSetup, TwoFactorVerification,
};
use crate::ApiResult;

impl ApiClient {
    /// Log in and store the issued tokens and profile in the session.
    ///
    /// An account with two-factor auth enabled answers `401` with
    /// `data.requires_2fa` when `otp_code` is missing or wrong; that maps to
    /// [`ApiError::OtpRequired`].
    #[instrument(skip(self, password, otp_code))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        otp_code: Option<&str>,
    ) -> ApiResult<LoginResponse> {
        let body = LoginRequest {
            username,
            password,
            otp_code,
        };
        let response = self.post_anonymous("/account/login/", &body).await?;
        let status = response.status();
        if status.as_u16() == 401 {
            let text = response.text().await?;
            if requires_two_factor(&text) {
                return Err(ApiError::OtpRequired);
            }
            return Err(ApiError::Status {
                status: 401,
                message: error_message(&text),
            });
        }

        let login: LoginResponse = decode(response).await?;
        let tokens = self.session().tokens();
        tokens.set_tokens(&login.access, &login.refresh).await?;
        tokens.set_profile(&login.user_data).await?;
        info!(role = %login.user_data.role(), "logged in");
        Ok(login)
    }

    /// Exchange the stored refresh token for a new access token.
    pub async fn refresh(&self) -> ApiResult<()> {
        let tokens = self.session().tokens();
        let refresh = tokens.refresh_token().await?.ok_or(ApiError::Unauthorized)?;

        let response = self
            .post_anonymous("/account/token/refresh/", &json!({ "refresh": refresh }))
            .await?;
        let renewed: TokenRefresh = decode(response).await?;
        match renewed.refresh {
            Some(rotated) => tokens.set_tokens(&renewed.access, &rotated).await?,
            None => tokens.set_access_token(&renewed.access).await?,
        }
        info!("access token refreshed");
        Ok(())
    }

    /// Forget the stored tokens and profile.
    pub async fn logout(&self) -> ApiResult<()> {
        self.session().tokens().clear().await?;
        info!("logged out");
        Ok(())
    }

    /// Start two-factor setup: QR code URL and secret for an authenticator app.
    pub async fn two_factor_setup(&self) -> ApiResult<TwoFactorSetup> {
        let reply: Envelope<TwoFactorSetup> = self.get_json("/account/2fa/setup/").await?;
        reply
            .data
            .ok_or_else(|| ApiError::UnexpectedResponse("2FA setup without data".to_string()))
    }

    /// Confirm two-factor setup with a code from the authenticator app.
    pub async fn verify_two_factor(&self, otp_code: &str) -> ApiResult<bool> {
        let reply: Envelope<TwoFactorVerification> = self
            .post_json("/account/2fa/setup/", &json!({ "otp_code": otp_code }))
            .await?;
        let verified = two_factor_verified(&reply);
        if !verified {
            tracing::warn!(status = %reply.status, message = ?reply.message, "2FA not verified");
        }
        Ok(verified)
    }

    /// Turn two-factor auth off. Returns the backend's `success` flag.
    pub async fn disable_two_factor(&self, password: &str) -> ApiResult<bool> {
        let reply: Envelope<Value> = self
            .post_json("/account/2fa/disable/", &json!({ "password": password }))
            .await?;
        Ok(reply.success)
    }

    pub async fn change_password(&self, body: &ChangePassword) -> ApiResult<ApiReply> {
        self.post_json("/account/change-password/", body).await
    }

    /// Rename the account; the stored profile follows on success.
    pub async fn update_username(&self, username: &str) -> ApiResult<ApiReply> {
        let reply: ApiReply = self
            .post_json("/account/update-username/", &json!({ "username": username }))
            .await?;
        if reply.success {
            let tokens = self.session().tokens();
            if let Some(mut profile) = tokens.profile().await? {
                profile.username = username.to_string();
                tokens.set_profile(&profile).await?;
            }
        }
        Ok(reply)
    }
}

/// Whether a login rejection body asks for a one-time code.
fn requires_two_factor(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/data/requires_2fa").and_then(Value::as_bool))
        .unwrap_or(false)
}
