use async_trait::async_trait;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};

use super::model::{BlacklistedToken, EmailOtp, OtpPurpose, PendingUser, User};
use super::schema::ErrorResponse;

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

pub type Result<T> = std::result::Result<T, AuthError>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>>;
    /// Case-insensitive.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Case-insensitive.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn username_exists(&self, username: &str) -> Result<bool>;
    async fn mobile_in_use(&self, mobile_no: &str, except_user_id: Option<&str>) -> Result<bool>;
    async fn list_users(&self) -> Result<Vec<User>>;
    /// Deletes the pending row and inserts `user` as one unit. Returns `false`
    /// when the pending row was already gone, in which case nothing is written.
    async fn promote_pending(&self, pending: &PendingUser, user: &User) -> Result<bool>;
    async fn update_profile(&self, user: &User) -> Result<()>;
    async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()>;
}

#[async_trait]
pub trait PendingUserRepository: Send + Sync {
    /// Inserts or replaces the staging row for `pending.email`.
    async fn upsert_pending(&self, pending: &PendingUser) -> Result<()>;
    async fn find_pending(&self, email: &str) -> Result<Option<PendingUser>>;
    async fn pending_mobile_in_use(&self, mobile_no: &str, except_email: &str) -> Result<bool>;
    async fn delete_pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait OtpRepository: Send + Sync {
    async fn insert_otp(&self, otp: &EmailOtp) -> Result<()>;
    /// Newest row for the pair, used or not.
    async fn latest_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Option<EmailOtp>>;
    async fn latest_unused_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Option<EmailOtp>>;
    /// Increments the attempt counter and returns the new value.
    async fn record_failed_attempt(&self, id: &str) -> Result<u32>;
    /// Flips `is_used` false -> true. Returns `false` if it was already used.
    async fn mark_otp_used(&self, id: &str) -> Result<bool>;
    async fn delete_otp(&self, id: &str) -> Result<()>;
    /// Deletes every row for `email`, or only those of `purpose` when given.
    async fn delete_otps(&self, email: &str, purpose: Option<OtpPurpose>) -> Result<u64>;
    async fn delete_expired_otps(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait TokenBlacklistRepository: Send + Sync {
    /// Returns `false` if the jti was already blacklisted.
    async fn blacklist_token(&self, token: &BlacklistedToken) -> Result<bool>;
    async fn is_blacklisted(&self, jti: &str) -> Result<bool>;
    async fn delete_expired_blacklist(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Everything the account flows persist, behind one object.
pub trait AccountRepository:
    UserRepository + PendingUserRepository + OtpRepository + TokenBlacklistRepository
{
}

impl<T> AccountRepository for T where
    T: UserRepository + PendingUserRepository + OtpRepository + TokenBlacklistRepository
{
}

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("An account with this email already exists.")]
    EmailAlreadyExists,

    #[error("This mobile number is already in use.")]
    MobileAlreadyExists,

    #[error("No account found with that email.")]
    UserNotFound,

    #[error("Your account is already verified. Please log in.")]
    AlreadyVerified,

    #[error("Invalid login or password.")]
    InvalidCredentials,

    #[error("Your account is not verified. Please check your email.")]
    AccountInactive,

    #[error("Invalid OTP. Please request a new code.")]
    InvalidOtp,

    #[error("OTP expired. Please request a new one.")]
    OtpExpired,

    #[error("Too many incorrect attempts. Please request a new OTP.")]
    TooManyAttempts,

    #[error("Too many requests. Please wait {retry_after_secs}s.")]
    Cooldown { retry_after_secs: i64 },

    #[error("Please verify the password reset OTP first.")]
    ResetNotVerified,

    #[error("Authentication credentials were not provided.")]
    MissingToken,

    #[error("Token is invalid or expired.")]
    InvalidToken,

    #[error("This access token has been blacklisted.")]
    TokenBlacklisted,

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("Could not send the OTP email. Please try again later.")]
    EmailDelivery(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::EmailAlreadyExists => StatusCode::BAD_REQUEST,
            Self::MobileAlreadyExists => StatusCode::BAD_REQUEST,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::AlreadyVerified => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AccountInactive => StatusCode::FORBIDDEN,
            Self::InvalidOtp => StatusCode::BAD_REQUEST,
            Self::OtpExpired => StatusCode::BAD_REQUEST,
            Self::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            Self::Cooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ResetNotVerified => StatusCode::BAD_REQUEST,
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::TokenBlacklisted => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::EmailDelivery(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::Database(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                ErrorResponse::new("Internal server error")
            }
            Self::EmailDelivery(reason) => {
                tracing::error!(%reason, "OTP email delivery failed");
                ErrorResponse::new(self.to_string())
            }
            _ => ErrorResponse::new(self.to_string()),
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::Cooldown { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
