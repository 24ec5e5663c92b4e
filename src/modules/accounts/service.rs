//! Registration, login, token and password-reset flows.
//!
//! Every flow is a short sequence of repository calls; the ordering matters:
//!
//! * issuing an OTP: cooldown check, delete stale rows for (email, purpose),
//!   insert the new row, send the email (the row is removed again if the send
//!   fails so the cooldown does not lock the user out);
//! * verifying: newest unused row, expiry, attempt budget, code comparison,
//!   compare-and-set on `is_used`, then the purpose-specific effect.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::config::AuthSettings;
use crate::services::jwt::{
    expiry_to_datetime, Claims, JwtService, TokenPair, ACCESS_TOKEN_TYPE, REFRESH_TOKEN_TYPE,
};
use crate::services::mailer::{otp_email, Mailer};
use crate::services::metrics::AccountMetricsCollector;
use crate::services::{hashing, otp};
use crate::AppState;

use super::interface::{AccountRepository, AuthError, Result};
use super::model::{normalize_email, BlacklistedToken, EmailOtp, OtpPurpose, PendingUser, User};
use super::schema::{validation_message, RegisterRequest, ResetPasswordRequest, UpdateProfileRequest};

const USERNAME_ATTEMPTS: usize = 20;

/// A logged-in user together with the tokens just issued for them.
#[derive(Debug)]
pub struct AuthSession {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResendOutcome {
    Sent,
    AlreadyVerified,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LogoutOutcome {
    LoggedOut,
    AlreadyInvalid,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub otps: u64,
    pub blacklisted_tokens: u64,
    pub pending_users: u64,
}

pub struct AccountService<'a> {
    store: &'a dyn AccountRepository,
    jwt: &'a JwtService,
    mailer: &'a dyn Mailer,
    settings: &'a AuthSettings,
    metrics: AccountMetricsCollector,
}

impl<'a> AccountService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store.as_ref(),
            jwt: &state.jwt_service,
            mailer: state.mailer.as_ref(),
            settings: &state.settings,
            metrics: AccountMetricsCollector::new(state.metrics.clone()),
        }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Stages the registration and mails the OTP. Returns the stored email.
    pub async fn register(&self, req: RegisterRequest) -> Result<String> {
        req.validate()
            .map_err(|e| AuthError::Validation(validation_message(&e)))?;

        if req.password != req.password2 {
            return Err(AuthError::Validation("Passwords do not match.".to_string()));
        }

        let email = normalize_email(&req.email);
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let mobile_no = non_empty(req.mobile_no);
        if let Some(mobile) = mobile_no.as_deref() {
            if self.store.mobile_in_use(mobile, None).await?
                || self.store.pending_mobile_in_use(mobile, &email).await?
            {
                return Err(AuthError::MobileAlreadyExists);
            }
        }

        if self.store.find_pending(&email).await?.is_some() {
            self.enforce_cooldown(&email, OtpPurpose::Registration).await?;
        }

        let password_hash = hashing::hash_password(&req.password)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let pending = PendingUser {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            password_hash,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            mobile_no,
            address: non_empty(req.address),
            pin_code: non_empty(req.pin_code),
            created_at: Utc::now(),
        };
        self.store.upsert_pending(&pending).await?;

        self.issue_otp(&email, OtpPurpose::Registration, None).await?;
        tracing::info!(email = %email, "registration staged");

        Ok(email)
    }

    pub async fn verify_registration(&self, email: Option<String>, code: Option<String>) -> Result<AuthSession> {
        let (email, code) = require_email_and_code(email, code)?;

        let Some(pending) = self.store.find_pending(&email).await? else {
            if self.store.find_user_by_email(&email).await?.is_some() {
                return Err(AuthError::AlreadyVerified);
            }
            self.metrics.record_otp_verification(OtpPurpose::Registration, "invalid");
            return Err(AuthError::InvalidOtp);
        };

        // Checked before the code is spent so the caller can re-register with another number.
        if let Some(mobile) = pending.mobile_no.as_deref() {
            if self.store.mobile_in_use(mobile, None).await? {
                return Err(AuthError::MobileAlreadyExists);
            }
        }

        self.consume_otp(&email, OtpPurpose::Registration, &code).await?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: self.unique_username(&pending.first_name).await?,
            email: pending.email.clone(),
            password_hash: pending.password_hash.clone(),
            first_name: pending.first_name.clone(),
            last_name: pending.last_name.clone(),
            mobile_no: pending.mobile_no.clone(),
            address: pending.address.clone(),
            pin_code: pending.pin_code.clone(),
            is_staff: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        if !self.store.promote_pending(&pending, &user).await? {
            return Err(AuthError::AlreadyVerified);
        }
        self.store.delete_otps(&email, None).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "registration verified");
        self.start_session(user, "registration")
    }

    pub async fn resend_registration(&self, email: Option<String>) -> Result<ResendOutcome> {
        let email = require_email(email, "Please provide your email to resend the OTP.")?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Ok(ResendOutcome::AlreadyVerified);
        }
        if self.store.find_pending(&email).await?.is_none() {
            return Err(AuthError::UserNotFound);
        }

        self.enforce_cooldown(&email, OtpPurpose::Registration).await?;
        self.issue_otp(&email, OtpPurpose::Registration, None).await?;

        Ok(ResendOutcome::Sent)
    }

    // =========================================================================
    // LOGIN / TOKENS
    // =========================================================================

    /// `login` is an email when it contains `@`, a username otherwise.
    pub async fn login(&self, login: Option<String>, password: Option<String>) -> Result<AuthSession> {
        let (Some(login), Some(password)) = (non_empty(login), password.filter(|p| !p.is_empty())) else {
            return Err(AuthError::Validation("Both login and password are required.".to_string()));
        };

        let user = if login.contains('@') {
            self.store.find_user_by_email(&normalize_email(&login)).await?
        } else {
            self.store.find_user_by_username(&login).await?
        };

        let Some(user) = user else {
            self.metrics.record_login("password", "unknown_user");
            return Err(AuthError::InvalidCredentials);
        };

        let valid = hashing::verify_password(&password, &user.password_hash)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        if !valid {
            self.metrics.record_login("password", "bad_password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            self.metrics.record_login("password", "inactive");
            return Err(AuthError::AccountInactive);
        }

        tracing::info!(user_id = %user.id, "password login");
        self.start_session(user, "password")
    }

    pub async fn request_login_otp(&self, email: Option<String>) -> Result<()> {
        let email = require_email(email, "Please provide your email.")?;

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        self.enforce_cooldown(&user.email, OtpPurpose::Login).await?;
        self.issue_otp(&user.email, OtpPurpose::Login, Some(&user.id)).await
    }

    pub async fn verify_login_otp(&self, email: Option<String>, code: Option<String>) -> Result<AuthSession> {
        let (email, code) = require_email_and_code(email, code)?;

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            self.metrics.record_otp_verification(OtpPurpose::Login, "invalid");
            return Err(AuthError::InvalidOtp);
        };
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        self.consume_otp(&user.email, OtpPurpose::Login, &code).await?;
        self.store.delete_otps(&user.email, Some(OtpPurpose::Login)).await?;

        tracing::info!(user_id = %user.id, "OTP login");
        self.start_session(user, "otp")
    }

    /// Blacklists the refresh token (when it is valid and belongs to the
    /// caller) and, in every case, the access token used for the request.
    pub async fn logout(&self, access: &Claims, refresh: Option<String>) -> Result<LogoutOutcome> {
        let Some(refresh) = non_empty(refresh) else {
            return Err(AuthError::Validation("Refresh token is required to log out.".to_string()));
        };

        let outcome = match self.jwt.verify_refresh_token(&refresh) {
            Ok(data) if data.claims.sub == access.sub => {
                let claims = data.claims;
                if self
                    .blacklist(&claims.jti, REFRESH_TOKEN_TYPE, &claims.sub, claims.exp)
                    .await?
                {
                    LogoutOutcome::LoggedOut
                } else {
                    LogoutOutcome::AlreadyInvalid
                }
            }
            _ => LogoutOutcome::AlreadyInvalid,
        };

        self.blacklist(&access.jti, ACCESS_TOKEN_TYPE, &access.sub, access.exp)
            .await?;

        tracing::info!(user_id = %access.sub, ?outcome, "logout");
        Ok(outcome)
    }

    /// Rotates a refresh token: the presented one is blacklisted and a new
    /// pair is issued.
    pub async fn refresh(&self, token: Option<String>) -> Result<AuthSession> {
        let token = non_empty(token).ok_or(AuthError::MissingToken)?;

        let claims = self
            .jwt
            .verify_refresh_token(&token)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        if self.store.is_blacklisted(&claims.jti).await? {
            tracing::warn!(user_id = %claims.sub, "blacklisted refresh token presented");
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .store
            .find_user_by_id(&claims.sub)
            .await?
            .filter(|user| user.is_active)
            .ok_or(AuthError::InvalidToken)?;

        // Losing this insert means a concurrent refresh already rotated it.
        if !self
            .blacklist(&claims.jti, REFRESH_TOKEN_TYPE, &claims.sub, claims.exp)
            .await?
        {
            return Err(AuthError::InvalidToken);
        }

        let tokens = self.issue_tokens(&user)?;
        Ok(AuthSession { user, tokens })
    }

    /// Resolves a bearer access token to its active user.
    pub async fn authenticate(&self, token: &str) -> Result<(User, Claims)> {
        let claims = self
            .jwt
            .verify_access_token(token)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        if self.store.is_blacklisted(&claims.jti).await? {
            return Err(AuthError::TokenBlacklisted);
        }

        let user = self
            .store
            .find_user_by_id(&claims.sub)
            .await?
            .filter(|user| user.is_active)
            .ok_or(AuthError::InvalidToken)?;

        Ok((user, claims))
    }

    // =========================================================================
    // PROFILE
    // =========================================================================

    pub async fn update_profile(&self, mut user: User, req: UpdateProfileRequest) -> Result<User> {
        req.validate()
            .map_err(|e| AuthError::Validation(validation_message(&e)))?;

        if let Some(first_name) = req.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = req.last_name {
            user.last_name = last_name.trim().to_string();
        }
        // A blank value clears the field.
        if let Some(mobile_no) = req.mobile_no {
            let mobile_no = non_empty(Some(mobile_no));
            if let Some(mobile) = mobile_no.as_deref() {
                if self.store.mobile_in_use(mobile, Some(&user.id)).await?
                    || self.store.pending_mobile_in_use(mobile, &user.email).await?
                {
                    return Err(AuthError::MobileAlreadyExists);
                }
            }
            user.mobile_no = mobile_no;
        }
        if let Some(address) = req.address {
            user.address = non_empty(Some(address));
        }
        if let Some(pin_code) = req.pin_code {
            user.pin_code = non_empty(Some(pin_code));
        }

        user.updated_at = Utc::now();
        self.store.update_profile(&user).await?;
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.store.list_users().await
    }

    // =========================================================================
    // PASSWORD RESET
    // =========================================================================

    /// `force` skips the cooldown.
    pub async fn request_password_reset(&self, email: Option<String>, force: bool) -> Result<String> {
        let email = require_email(email, "Please provide your email.")?;

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !force {
            self.enforce_cooldown(&user.email, OtpPurpose::PasswordReset).await?;
        }
        self.issue_otp(&user.email, OtpPurpose::PasswordReset, Some(&user.id)).await?;

        Ok(user.email)
    }

    pub async fn verify_password_reset(&self, email: Option<String>, code: Option<String>) -> Result<String> {
        let (email, code) = require_email_and_code(email, code)?;

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.consume_otp(&user.email, OtpPurpose::PasswordReset, &code).await?;
        Ok(user.email)
    }

    /// Requires a consumed, unexpired reset OTP for the email.
    pub async fn reset_password(&self, req: ResetPasswordRequest) -> Result<String> {
        req.validate()
            .map_err(|e| AuthError::Validation(validation_message(&e)))?;

        if req.new_password != req.confirm_password {
            return Err(AuthError::Validation("Passwords do not match.".to_string()));
        }

        let email = normalize_email(&req.email);
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let now = Utc::now();
        match self.store.latest_otp(&user.email, OtpPurpose::PasswordReset).await? {
            Some(otp) if otp.is_used && !otp.is_expired_at(now) => {}
            _ => return Err(AuthError::ResetNotVerified),
        }

        let password_hash = hashing::hash_password(&req.new_password)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        self.store.update_password(&user.id, &password_hash).await?;
        self.store
            .delete_otps(&user.email, Some(OtpPurpose::PasswordReset))
            .await?;

        tracing::info!(user_id = %user.id, "password reset");
        Ok(user.email)
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Creates an active staff account.
    pub async fn create_superuser(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email);
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = hashing::hash_password(password)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: self.unique_username("admin").await?,
            email,
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            mobile_no: None,
            address: None,
            pin_code: None,
            is_staff: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, email = %user.email, "superuser created");
        Ok(user)
    }

    /// Drops expired OTPs and blacklist rows, and stale pending registrations.
    pub async fn purge_expired(&self) -> Result<PurgeReport> {
        let now = Utc::now();
        let report = PurgeReport {
            otps: self.store.delete_expired_otps(now).await?,
            blacklisted_tokens: self.store.delete_expired_blacklist(now).await?,
            pending_users: self
                .store
                .delete_pending_created_before(now - self.settings.pending_user_ttl)
                .await?,
        };

        if report != PurgeReport::default() {
            tracing::info!(
                otps = report.otps,
                blacklisted_tokens = report.blacklisted_tokens,
                pending_users = report.pending_users,
                "purged expired account rows"
            );
        }
        Ok(report)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn enforce_cooldown(&self, email: &str, purpose: OtpPurpose) -> Result<()> {
        let Some(last) = self.store.latest_otp(email, purpose).await? else {
            return Ok(());
        };

        if let Some(retry_after_secs) = cooldown_remaining(last.created_at, Utc::now(), self.settings.otp_cooldown) {
            tracing::debug!(email = %email, %purpose, retry_after_secs, "OTP cooldown active");
            return Err(AuthError::Cooldown { retry_after_secs });
        }
        Ok(())
    }

    async fn issue_otp(&self, email: &str, purpose: OtpPurpose, user_id: Option<&str>) -> Result<()> {
        self.store.delete_otps(email, Some(purpose)).await?;

        let now = Utc::now();
        let otp = EmailOtp {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.map(str::to_string),
            email: email.to_string(),
            code: otp::generate_code(),
            purpose: purpose.as_str().to_string(),
            created_at: now,
            expires_at: now + self.settings.otp_ttl,
            attempts: 0,
            is_used: false,
        };
        self.store.insert_otp(&otp).await?;

        let message = otp_email(email, &otp.code, purpose, self.settings.otp_ttl.num_minutes());
        if let Err(e) = self.mailer.send(message).await {
            self.store.delete_otp(&otp.id).await?;
            return Err(AuthError::EmailDelivery(e.to_string()));
        }

        self.metrics.record_otp_issued(purpose);
        tracing::info!(email = %email, %purpose, "OTP issued");
        Ok(())
    }

    async fn consume_otp(&self, email: &str, purpose: OtpPurpose, code: &str) -> Result<EmailOtp> {
        let outcome = self.check_otp(email, purpose, code).await;
        let label = match &outcome {
            Ok(_) => "success",
            Err(AuthError::OtpExpired) => "expired",
            Err(AuthError::TooManyAttempts) => "locked",
            Err(_) => "invalid",
        };
        self.metrics.record_otp_verification(purpose, label);
        outcome
    }

    async fn check_otp(&self, email: &str, purpose: OtpPurpose, code: &str) -> Result<EmailOtp> {
        let otp = self
            .store
            .latest_unused_otp(email, purpose)
            .await?
            .ok_or(AuthError::InvalidOtp)?;

        if otp.is_expired_at(Utc::now()) {
            return Err(AuthError::OtpExpired);
        }
        if otp.attempts >= self.settings.otp_max_attempts {
            return Err(AuthError::TooManyAttempts);
        }

        if !otp::codes_match(&otp.code, code) {
            let attempts = self.store.record_failed_attempt(&otp.id).await?;
            tracing::warn!(email = %email, %purpose, attempts, "wrong OTP submitted");
            if attempts >= self.settings.otp_max_attempts {
                return Err(AuthError::TooManyAttempts);
            }
            return Err(AuthError::InvalidOtp);
        }

        if !self.store.mark_otp_used(&otp.id).await? {
            return Err(AuthError::InvalidOtp);
        }
        Ok(otp)
    }

    async fn unique_username(&self, first_name: &str) -> Result<String> {
        for _ in 0..USERNAME_ATTEMPTS {
            let candidate = otp::username_candidate(first_name);
            if !self.store.username_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(AuthError::Internal("could not generate a unique username".to_string()))
    }

    fn issue_tokens(&self, user: &User) -> Result<TokenPair> {
        self.jwt
            .issue_pair(&user.id, &user.email)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    fn start_session(&self, user: User, method: &str) -> Result<AuthSession> {
        let tokens = self.issue_tokens(&user)?;
        self.metrics.record_login(method, "success");
        Ok(AuthSession { user, tokens })
    }

    async fn blacklist(&self, jti: &str, token_type: &str, user_id: &str, exp: i64) -> Result<bool> {
        let inserted = self
            .store
            .blacklist_token(&BlacklistedToken {
                jti: jti.to_string(),
                token_type: token_type.to_string(),
                user_id: user_id.to_string(),
                expires_at: expiry_to_datetime(exp),
                blacklisted_at: Utc::now(),
            })
            .await?;
        if inserted {
            self.metrics.record_blacklisted(token_type);
        }
        Ok(inserted)
    }
}

/// Whole seconds left until a new OTP may be issued, if any.
fn cooldown_remaining(last_issued: DateTime<Utc>, now: DateTime<Utc>, cooldown: Duration) -> Option<i64> {
    let remaining = cooldown - (now - last_issued);
    if remaining <= Duration::zero() {
        return None;
    }
    let millis = remaining.num_milliseconds();
    Some((millis + 999) / 1000)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require_email(email: Option<String>, message: &str) -> Result<String> {
    non_empty(email)
        .map(|e| normalize_email(&e))
        .ok_or_else(|| AuthError::Validation(message.to_string()))
}

fn require_email_and_code(email: Option<String>, code: Option<String>) -> Result<(String, String)> {
    match (non_empty(email), non_empty(code)) {
        (Some(email), Some(code)) => Ok((normalize_email(&email), code)),
        _ => Err(AuthError::Validation("Email and OTP are required.".to_string())),
    }
}
