use axum::http::StatusCode;
use chrono::Duration;
use commerce_api::modules::accounts::model::OtpPurpose;
use serde_json::{json, Value};

use crate::common::{test_email, test_password, wrong_code, TestContext};

const NEW_PASSWORD: &str = "BrandNewPassword456!";

async fn forgot(ctx: &TestContext, email: &str) -> axum_test::TestResponse {
    ctx.server
        .post("/api/accounts/password/forgot")
        .json(&json!({ "email": email }))
        .await
}

async fn verify_reset(ctx: &TestContext, email: &str, otp: &str) -> axum_test::TestResponse {
    ctx.server
        .post("/api/accounts/password/verify-otp")
        .json(&json!({ "email": email, "otp": otp }))
        .await
}

async fn reset(ctx: &TestContext, email: &str) -> axum_test::TestResponse {
    ctx.server
        .post("/api/accounts/password/reset")
        .json(&json!({
            "email": email,
            "new_password": NEW_PASSWORD,
            "confirm_password": NEW_PASSWORD
        }))
        .await
}

#[tokio::test]
async fn full_reset_flow_changes_password() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;

    forgot(&ctx, &email).await.assert_status_ok();
    let sent = ctx.mailer.sent_to(&email);
    assert_eq!(sent.last().unwrap().subject, "Password Reset OTP");

    let code = ctx.last_code(&email);
    verify_reset(&ctx, &email, &code).await.assert_status_ok();
    reset(&ctx, &email).await.assert_status_ok();

    ctx.login(&email, test_password())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    ctx.login(&email, NEW_PASSWORD).await.assert_status_ok();
    assert_eq!(ctx.store.otp_count(&email, OtpPurpose::PasswordReset), 0);
}

#[tokio::test]
async fn reset_without_verified_otp_returns_400() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;
    forgot(&ctx, &email).await.assert_status_ok();

    let response = reset(&ctx, &email).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Please verify the password reset OTP first.");
}

#[tokio::test]
async fn reset_cannot_be_repeated_with_same_verification() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;
    forgot(&ctx, &email).await;
    let code = ctx.last_code(&email);
    verify_reset(&ctx, &email, &code).await.assert_status_ok();

    reset(&ctx, &email).await.assert_status_ok();
    reset(&ctx, &email)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_after_verified_otp_expires_returns_400() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;
    forgot(&ctx, &email).await;
    let code = ctx.last_code(&email);
    verify_reset(&ctx, &email, &code).await.assert_status_ok();
    ctx.store.age_otps(&email, OtpPurpose::PasswordReset, Duration::minutes(11));

    reset(&ctx, &email)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_reset_code_returns_400() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;
    forgot(&ctx, &email).await;
    let code = ctx.last_code(&email);

    verify_reset(&ctx, &email, &wrong_code(&code))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forgot_for_unknown_email_returns_404() {
    let ctx = TestContext::new();

    forgot(&ctx, &test_email())
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forgot_respects_cooldown_unless_forced() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;
    forgot(&ctx, &email).await.assert_status_ok();

    forgot(&ctx, &email)
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    ctx.server
        .post("/api/accounts/password/forgot")
        .json(&json!({ "email": &email, "force": true }))
        .await
        .assert_status_ok();
    assert_eq!(ctx.store.otp_count(&email, OtpPurpose::PasswordReset), 1);
}

#[tokio::test]
async fn mismatched_new_passwords_return_400() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;

    ctx.server
        .post("/api/accounts/password/reset")
        .json(&json!({
            "email": &email,
            "new_password": NEW_PASSWORD,
            "confirm_password": "SomethingElse789!"
        }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registration_code_cannot_reset_password() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register(&email).await;
    let registration_code = ctx.last_code(&email);
    ctx.verify(&email, &registration_code).await.assert_status_ok();

    forgot(&ctx, &email).await.assert_status_ok();
    let reset_code = ctx.last_code(&email);
    if reset_code != registration_code {
        verify_reset(&ctx, &email, &registration_code)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
