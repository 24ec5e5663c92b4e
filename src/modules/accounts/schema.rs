use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::LazyLock;
use validator::Validate;

use super::model::User;

static MOBILE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{10}$").expect("valid regex"));
static PIN_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{6}$").expect("valid regex"));
// Profile updates accept an empty string to clear the field.
static MOBILE_OR_BLANK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{10})?$").expect("valid regex"));
static PIN_CODE_OR_BLANK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{6})?$").expect("valid regex"));

/// Trims an optional string and treats `""` like an omitted field.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

/// Trims an optional string, keeping `""` so it can clear a stored value.
fn trimmed<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(|v| v.trim().to_string()))
}

// =============================================================================
// REGISTER
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters."))]
    pub password: String,
    pub password2: String,
    #[serde(default)]
    #[validate(length(max = 30, message = "First name must be at most 30 characters."))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 30, message = "Last name must be at most 30 characters."))]
    pub last_name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(regex(path = *MOBILE_RE, message = "Mobile number must be 10 digits."))]
    pub mobile_no: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(regex(path = *PIN_CODE_RE, message = "Pin code must be 6 digits."))]
    pub pin_code: Option<String>,
}

// =============================================================================
// OTP
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub otp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: Option<String>,
}

// =============================================================================
// LOGIN / TOKENS
// =============================================================================

/// `login` may be an email address or a username.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default, alias = "email", alias = "username")]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenObtainRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub access: String,
    pub refresh: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access: String,
    pub refresh: String,
}

// =============================================================================
// PASSWORD RESET
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters."))]
    pub new_password: String,
    pub confirm_password: String,
}

// =============================================================================
// PROFILE
// =============================================================================

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 30, message = "First name must be at most 30 characters."))]
    pub first_name: Option<String>,
    #[validate(length(max = 30, message = "Last name must be at most 30 characters."))]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(regex(path = *MOBILE_OR_BLANK_RE, message = "Mobile number must be 10 digits."))]
    pub mobile_no: Option<String>,
    pub address: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(regex(path = *PIN_CODE_OR_BLANK_RE, message = "Pin code must be 6 digits."))]
    pub pin_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub data: UserResponse,
}

// =============================================================================
// SHARED
// =============================================================================

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub mobile_no: Option<String>,
    pub address: Option<String>,
    pub pin_code: Option<String>,
    pub is_staff: bool,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            mobile_no: user.mobile_no,
            address: user.address,
            pin_code: user.pin_code,
            is_staff: user.is_staff,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl MessageResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            email: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            status: "info",
            message: message.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// Flattens validator output into one readable sentence.
pub fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}.", field))
            })
        })
        .collect();
    messages.sort();
    messages.join(" ")
}
