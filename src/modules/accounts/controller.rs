use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::AppendHeaders,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppState;

use super::cookie::{clear_refresh_cookie, read_cookie, refresh_cookie, set_cookie_header, REFRESH_COOKIE};
use super::extractor::{AdminUser, AuthUser, JsonBody, OptionalJson};
use super::interface::AuthError;
use super::schema::{
    AuthResponse, EmailRequest, ForgotPasswordRequest, LoginRequest, MessageResponse, ProfileResponse,
    RefreshRequest, RegisterRequest, ResetPasswordRequest, TokenObtainRequest, TokenResponse,
    UpdateProfileRequest, UserResponse, VerifyOtpRequest,
};
use super::service::{AccountService, AuthSession, LogoutOutcome, ResendOutcome};

type CookieHeader = AppendHeaders<Option<(HeaderName, HeaderValue)>>;
type WithCookie<T> = (StatusCode, CookieHeader, Json<T>);

pub async fn api_root() -> Json<Value> {
    Json(json!({
        "register": "/api/accounts/register",
        "verify_otp": "/api/accounts/otp/verify",
        "resend_otp": "/api/accounts/otp/resend",
        "login": "/api/accounts/login",
        "login_otp_request": "/api/accounts/login/otp/request",
        "login_otp_verify": "/api/accounts/login/otp/verify",
        "logout": "/api/accounts/logout",
        "profile": "/api/accounts/profile",
        "users": "/api/accounts/users",
        "forgot_password": "/api/accounts/password/forgot",
        "verify_reset_otp": "/api/accounts/password/verify-otp",
        "reset_password": "/api/accounts/password/reset",
        "token": "/api/accounts/token",
        "token_refresh": "/api/accounts/token/refresh",
    }))
}

// =============================================================================
// REGISTRATION
// =============================================================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    let email = AccountService::new(&state).register(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(
            MessageResponse::success("Registration successful. Please verify the OTP sent to your email.")
                .with_email(email),
        ),
    ))
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<VerifyOtpRequest>,
) -> Result<WithCookie<AuthResponse>, AuthError> {
    let session = AccountService::new(&state)
        .verify_registration(req.email, req.otp)
        .await?;

    Ok(session_response(&state, session, "Email verified successfully."))
}

pub async fn resend_otp(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<EmailRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let response = match AccountService::new(&state).resend_registration(req.email).await? {
        ResendOutcome::Sent => MessageResponse::success("A new OTP has been sent to your email."),
        ResendOutcome::AlreadyVerified => {
            MessageResponse::info("This email is already verified. Please log in.")
        }
    };
    Ok(Json(response))
}

// =============================================================================
// LOGIN / LOGOUT
// =============================================================================

pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<WithCookie<AuthResponse>, AuthError> {
    let session = AccountService::new(&state)
        .login(req.login, req.password)
        .await?;

    Ok(session_response(&state, session, "Login successful."))
}

pub async fn request_login_otp(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<EmailRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    AccountService::new(&state).request_login_otp(req.email).await?;
    Ok(Json(MessageResponse::success("A login OTP has been sent to your email.")))
}

pub async fn verify_login_otp(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<VerifyOtpRequest>,
) -> Result<WithCookie<AuthResponse>, AuthError> {
    let session = AccountService::new(&state)
        .verify_login_otp(req.email, req.otp)
        .await?;

    Ok(session_response(&state, session, "Login successful."))
}

/// The refresh token comes from the body, falling back to the cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    headers: HeaderMap,
    OptionalJson(req): OptionalJson<RefreshRequest>,
) -> Result<(StatusCode, CookieHeader, Json<MessageResponse>), AuthError> {
    let refresh = req.refresh.or_else(|| read_cookie(&headers, REFRESH_COOKIE));

    let outcome = AccountService::new(&state)
        .logout(&caller.claims, refresh)
        .await?;

    let response = match outcome {
        LogoutOutcome::LoggedOut => MessageResponse::success("Logged out successfully."),
        LogoutOutcome::AlreadyInvalid => MessageResponse::info("Token already invalid or expired."),
    };

    Ok((
        StatusCode::OK,
        AppendHeaders(set_cookie_header(&clear_refresh_cookie(state.settings.cookie_secure))),
        Json(response),
    ))
}

// =============================================================================
// TOKENS
// =============================================================================

pub async fn obtain_token(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<TokenObtainRequest>,
) -> Result<WithCookie<TokenResponse>, AuthError> {
    let session = AccountService::new(&state)
        .login(Some(req.email), Some(req.password))
        .await?;

    Ok(token_response(&state, session))
}

/// The cookie wins over a `refresh` field in the body.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    OptionalJson(req): OptionalJson<RefreshRequest>,
) -> Result<WithCookie<TokenResponse>, AuthError> {
    let token = read_cookie(&headers, REFRESH_COOKIE).or(req.refresh);
    let session = AccountService::new(&state).refresh(token).await?;

    Ok(token_response(&state, session))
}

// =============================================================================
// PROFILE
// =============================================================================

pub async fn get_profile(caller: AuthUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        status: "success",
        message: "Profile retrieved successfully.",
        data: caller.user.into(),
    })
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    JsonBody(req): JsonBody<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AuthError> {
    let user = AccountService::new(&state)
        .update_profile(caller.user, req)
        .await?;

    Ok(Json(ProfileResponse {
        status: "success",
        message: "Profile updated successfully.",
        data: user.into(),
    }))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserResponse>>, AuthError> {
    let users = AccountService::new(&state).list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

// =============================================================================
// PASSWORD RESET
// =============================================================================

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let email = AccountService::new(&state)
        .request_password_reset(req.email, req.force)
        .await?;

    Ok(Json(
        MessageResponse::success("Password reset OTP sent to your email.").with_email(email),
    ))
}

pub async fn verify_reset_otp(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<VerifyOtpRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let email = AccountService::new(&state)
        .verify_password_reset(req.email, req.otp)
        .await?;

    Ok(Json(
        MessageResponse::success("OTP verified. You can now reset your password.").with_email(email),
    ))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    AccountService::new(&state).reset_password(req).await?;
    Ok(Json(MessageResponse::success("Password has been reset successfully.")))
}

// =============================================================================
// HELPERS
// =============================================================================

fn session_cookie(state: &AppState, session: &AuthSession) -> CookieHeader {
    let cookie = refresh_cookie(
        &session.tokens.refresh_token,
        state.jwt_service.get_refresh_token_duration_secs(),
        state.settings.cookie_secure,
    );
    AppendHeaders(set_cookie_header(&cookie))
}

fn session_response(state: &AppState, session: AuthSession, message: &'static str) -> WithCookie<AuthResponse> {
    let cookie = session_cookie(state, &session);
    let AuthSession { user, tokens } = session;

    (
        StatusCode::OK,
        cookie,
        Json(AuthResponse {
            status: "success",
            message,
            access: tokens.access_token,
            refresh: tokens.refresh_token,
            user: user.into(),
        }),
    )
}

fn token_response(state: &AppState, session: AuthSession) -> WithCookie<TokenResponse> {
    let cookie = session_cookie(state, &session);

    (
        StatusCode::OK,
        cookie,
        Json(TokenResponse {
            access: session.tokens.access_token,
            refresh: session.tokens.refresh_token,
        }),
    )
}
