use axum::http::{header, StatusCode};
use chrono::Duration;
use commerce_api::modules::accounts::model::OtpPurpose;
use serde_json::{json, Value};

use crate::common::{test_email, test_password, TestContext};

#[tokio::test]
async fn register_stages_pending_user_and_sends_otp() {
    let ctx = TestContext::new();
    let email = test_email();

    let response = ctx.register(&email).await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["email"], email.as_str());

    assert_eq!(ctx.store.pending_count(), 1);
    assert_eq!(ctx.store.user_count(), 0);
    assert_eq!(ctx.store.otp_count(&email, OtpPurpose::Registration), 1);

    let sent = ctx.mailer.sent_to(&email);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Your OTP Code");
    assert_eq!(ctx.last_code(&email).len(), 6);
}

#[tokio::test]
async fn register_with_mismatched_passwords_returns_400() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/accounts/register")
        .json(&json!({
            "email": test_email(),
            "password": test_password(),
            "password2": "DifferentPassword123!"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(ctx.store.pending_count(), 0);
    assert!(ctx.mailer.sent().is_empty());
}

#[tokio::test]
async fn register_with_invalid_email_returns_400() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/accounts/register")
        .json(&json!({
            "email": "not-an-email",
            "password": test_password(),
            "password2": test_password()
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_with_short_password_returns_400() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/accounts/register")
        .json(&json!({
            "email": test_email(),
            "password": "short",
            "password2": "short"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_with_missing_fields_returns_400() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/accounts/register")
        .json(&json!({ "email": test_email() }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_with_verified_email_returns_400() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;

    let response = ctx.register(&email).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "An account with this email already exists.");
}

#[tokio::test]
async fn register_with_mobile_in_use_returns_400() {
    let ctx = TestContext::new();

    let first = ctx
        .server
        .post("/api/accounts/register")
        .json(&json!({
            "email": test_email(),
            "password": test_password(),
            "password2": test_password(),
            "mobile_no": "9876543210"
        }))
        .await;
    first.assert_status(StatusCode::CREATED);

    let second = ctx
        .server
        .post("/api/accounts/register")
        .json(&json!({
            "email": test_email(),
            "password": test_password(),
            "password2": test_password(),
            "mobile_no": "9876543210"
        }))
        .await;

    second.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = second.json();
    assert_eq!(body["error"], "This mobile number is already in use.");
}

#[tokio::test]
async fn register_with_malformed_mobile_returns_400() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/accounts/register")
        .json(&json!({
            "email": test_email(),
            "password": test_password(),
            "password2": test_password(),
            "mobile_no": "12345"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_with_blank_optional_fields_succeeds() {
    let ctx = TestContext::new();
    let email = test_email();

    let response = ctx
        .server
        .post("/api/accounts/register")
        .json(&json!({
            "email": &email,
            "password": test_password(),
            "password2": test_password(),
            "mobile_no": "",
            "address": "",
            "pin_code": ""
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let code = ctx.last_code(&email);
    let body: Value = ctx.verify(&email, &code).await.json();
    assert!(body["user"]["mobile_no"].is_null());
    assert!(body["user"]["pin_code"].is_null());
}

#[tokio::test]
async fn re_register_within_cooldown_returns_429() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register(&email).await.assert_status(StatusCode::CREATED);

    let response = ctx.register(&email).await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let retry_after: i64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
    assert_eq!(ctx.mailer.sent_to(&email).len(), 1);
}

#[tokio::test]
async fn re_register_after_cooldown_replaces_pending_and_otp() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register(&email).await.assert_status(StatusCode::CREATED);
    ctx.store.age_otps(&email, OtpPurpose::Registration, Duration::seconds(61));

    ctx.register(&email).await.assert_status(StatusCode::CREATED);

    assert_eq!(ctx.store.pending_count(), 1);
    assert_eq!(ctx.store.otp_count(&email, OtpPurpose::Registration), 1);
    assert_eq!(ctx.mailer.sent_to(&email).len(), 2);
}

#[tokio::test]
async fn failed_email_delivery_returns_503_and_leaves_no_otp() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.mailer.set_failing(true);

    let response = ctx.register(&email).await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(ctx.store.otp_count(&email, OtpPurpose::Registration), 0);

    // No cooldown is left behind by the failed send.
    ctx.mailer.set_failing(false);
    ctx.register(&email).await.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn resend_within_cooldown_returns_429() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register(&email).await;

    let response = ctx
        .server
        .post("/api/accounts/otp/resend")
        .json(&json!({ "email": &email }))
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn resend_after_cooldown_sends_new_code() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register(&email).await;
    ctx.store.age_otps(&email, OtpPurpose::Registration, Duration::seconds(61));

    let response = ctx
        .server
        .post("/api/accounts/otp/resend")
        .json(&json!({ "email": &email }))
        .await;

    response.assert_status_ok();
    assert_eq!(ctx.mailer.sent_to(&email).len(), 2);
    assert_eq!(ctx.store.otp_count(&email, OtpPurpose::Registration), 1);

    // The resent code is the one that verifies.
    let code = ctx.last_code(&email);
    ctx.verify(&email, &code).await.assert_status_ok();
}

#[tokio::test]
async fn resend_for_unknown_email_returns_404() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/accounts/otp/resend")
        .json(&json!({ "email": test_email() }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resend_for_verified_account_returns_info() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;

    let response = ctx
        .server
        .post("/api/accounts/otp/resend")
        .json(&json!({ "email": &email }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "info");
}

#[tokio::test]
async fn resend_without_email_returns_400() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/accounts/otp/resend")
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}
