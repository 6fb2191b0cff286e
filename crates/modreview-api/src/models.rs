//! Request and response bodies for the moderation backend.

use modreview_core::UserProfile;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_code: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user_data: UserProfile,
}

/// Body of `/account/token/refresh/`. The refresh token rotates when present.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenRefresh {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// The backend's standard `{status, data, message, success}` wrapper.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: bool,
}

/// An envelope whose payload callers do not inspect.
pub type ApiReply = Envelope<serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TwoFactorSetup {
    pub qr_code_url: String,
    pub secret_key: String,
    #[serde(default)]
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TwoFactorVerification {
    #[serde(default)]
    pub is_verified: bool,
}

/// Whether a 2FA verification reply means the code was accepted.
///
/// Some backend versions answer with `data: null` and only a message, so a
/// successful reply whose message mentions "verified" also counts.
pub fn two_factor_verified(reply: &Envelope<TwoFactorVerification>) -> bool {
    if !reply.success {
        return false;
    }
    if reply.data.as_ref().is_some_and(|d| d.is_verified) {
        return true;
    }
    reply
        .message
        .as_deref()
        .is_some_and(|m| m.to_lowercase().contains("verified"))
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// `{status, message}` reply of task actions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusMessage {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl StatusMessage {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AiOutput {
    pub classification: String,
    #[serde(deserialize_with = "number_or_string")]
    pub confidence: f64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub requires_human_review: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct HumanReview {
    #[serde(default)]
    pub correction: Option<String>,
    #[serde(default)]
    pub justification: Option<String>,
}

/// A task as the queue endpoints return it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawTask {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub serial_no: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub ai_output: Option<AiOutput>,
    #[serde(default)]
    pub predicted_label: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub human_reviewed: bool,
    #[serde(default)]
    pub human_review: Option<HumanReview>,
    #[serde(default)]
    pub final_label: Option<String>,
    #[serde(default)]
    pub processing_status: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A task normalized for display and for starting an exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewTask {
    pub id: String,
    pub serial_no: Option<String>,
    pub text: Option<String>,
    pub ai_classification: Option<String>,
    pub confidence: Option<f64>,
    pub human_reviewed: bool,
    pub human_review: Option<HumanReview>,
    pub final_label: Option<String>,
    pub priority: Option<String>,
    pub processing_status: String,
    pub assigned_to: Option<String>,
    pub created_at: Option<String>,
}

impl From<RawTask> for ReviewTask {
    fn from(raw: RawTask) -> Self {
        let ai_text = raw.ai_output.as_ref().and_then(|ai| ai.text.clone());
        let (ai_classification, confidence) = match raw.ai_output {
            Some(ai) => (Some(ai.classification), Some(ai.confidence)),
            None => (raw.predicted_label, None),
        };
        ReviewTask {
            id: raw.id,
            serial_no: raw.serial_no,
            text: raw.data.or(ai_text),
            ai_classification,
            confidence,
            human_reviewed: raw.human_reviewed,
            human_review: raw.human_review,
            final_label: raw.final_label,
            priority: raw.priority,
            processing_status: raw.processing_status,
            assigned_to: raw.assigned_to,
            created_at: raw.created_at,
        }
    }
}

/// A task the current user submitted for classification.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubmittedTask {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub human_reviewed: bool,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub serial_no: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub submitted_by: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

// ---------------------------------------------------------------------------
// Lenient field decoding: the backend is not consistent about ids and numbers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Text(s) => s,
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Scalar::deserialize(deserializer)?.into_string())
}

fn opt_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_string))
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Scalar::deserialize(deserializer)? {
        Scalar::Int(n) => Ok(n as f64),
        Scalar::Float(n) => Ok(n),
        Scalar::Text(s) => s.trim().parse().map_err(de::Error::custom),
        Scalar::Bool(_) => Err(de::Error::custom("expected a number")),
    }
}

/// `true`/`false`, or the `"Yes"`/`"No"` some endpoints send.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Scalar::Bool(b)) => Ok(b),
        Some(Scalar::Int(n)) => Ok(n != 0),
        Some(Scalar::Float(n)) => Ok(n != 0.0),
        Some(Scalar::Text(s)) => Ok(matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "yes" | "true" | "1"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_request_omits_missing_otp() {
        let body = LoginRequest {
            username: "rita",
            password: "pw",
            otp_code: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"username": "rita", "password": "pw"})
        );
    }

    #[test]
    fn test_login_response_parses_profile() {
        let resp: LoginResponse = serde_json::from_value(json!({
            "access": "a",
            "refresh": "r",
            "user_data": {"id": 9, "username": "rita", "email": "r@x", "is_reviewer": true, "is_admin": false}
        }))
        .unwrap();
        assert_eq!(resp.user_data.username, "rita");
        assert!(resp.user_data.is_reviewer);
    }

    #[test]
    fn test_two_factor_verified_by_flag() {
        let reply: Envelope<TwoFactorVerification> = serde_json::from_value(json!({
            "status": "ok", "data": {"is_verified": true}, "message": null, "success": true
        }))
        .unwrap();
        assert!(two_factor_verified(&reply));
    }

    #[test]
    fn test_two_factor_verified_by_message() {
        let reply: Envelope<TwoFactorVerification> = serde_json::from_value(json!({
            "status": "ok", "data": null, "message": "2FA Verified successfully", "success": true
        }))
        .unwrap();
        assert!(two_factor_verified(&reply));
    }

    #[test]
    fn test_two_factor_not_verified() {
        let failed: Envelope<TwoFactorVerification> = serde_json::from_value(json!({
            "status": "error", "data": {"is_verified": true}, "message": "verified", "success": false
        }))
        .unwrap();
        assert!(!two_factor_verified(&failed));

        let unverified: Envelope<TwoFactorVerification> = serde_json::from_value(json!({
            "status": "ok", "data": {"is_verified": false}, "message": "invalid code", "success": true
        }))
        .unwrap();
        assert!(!two_factor_verified(&unverified));
    }

    #[test]
    fn test_raw_task_normalizes() {
        let raw: RawTask = serde_json::from_value(json!({
            "id": 17,
            "serial_no": "T-17",
            "task_type": "TEXT",
            "data": "you are all idiots",
            "ai_output": {
                "text": "you are all idiots",
                "classification": "Highly Offensive",
                "confidence": "0.91",
                "requires_human_review": true,
                "human_review": {"correction": null, "justification": null}
            },
            "predicted_label": "Highly Offensive",
            "human_reviewed": false,
            "final_label": null,
            "processing_status": "ASSIGNED_REVIEWER",
            "assigned_to": 3,
            "created_at": "2024-05-01T10:00:00Z",
            "priority": "HIGH",
            "group": 1
        }))
        .unwrap();

        let task = ReviewTask::from(raw);
        assert_eq!(task.id, "17");
        assert_eq!(task.assigned_to.as_deref(), Some("3"));
        assert_eq!(task.ai_classification.as_deref(), Some("Highly Offensive"));
        assert_eq!(task.confidence, Some(0.91));
        assert_eq!(task.text.as_deref(), Some("you are all idiots"));
        assert!(!task.human_reviewed);
        assert_eq!(task.final_label, None);
    }

    #[test]
    fn test_raw_task_without_ai_output_uses_predicted_label() {
        let raw: RawTask = serde_json::from_value(json!({
            "id": "abc",
            "predicted_label": "safe",
            "human_reviewed": "Yes",
            "processing_status": "PENDING",
            "assigned_to": null
        }))
        .unwrap();
        let task = ReviewTask::from(raw);
        assert_eq!(task.ai_classification.as_deref(), Some("safe"));
        assert_eq!(task.confidence, None);
        assert!(task.human_reviewed);
        assert_eq!(task.assigned_to, None);
    }

    #[test]
    fn test_status_message_success() {
        let msg: StatusMessage =
            serde_json::from_value(json!({"status": "success", "message": "Task assigned"}))
                .unwrap();
        assert!(msg.is_success());
    }
}
