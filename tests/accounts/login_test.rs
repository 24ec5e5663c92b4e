use axum::http::{header, StatusCode};
use serde_json::{json, Value};

use crate::common::{test_email, test_password, TestContext};

#[tokio::test]
async fn login_with_email_returns_tokens_and_cookie() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;

    let response = ctx.login(&email, test_password()).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Login successful.");
    assert!(body["access"].as_str().is_some());
    assert!(body["refresh"].as_str().is_some());
    assert_eq!(body["user"]["email"], email.as_str());

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains(body["refresh"].as_str().unwrap()));
}

#[tokio::test]
async fn login_with_username_succeeds() {
    let ctx = TestContext::new();
    let email = test_email();
    let verified = ctx.register_and_verify(&email).await;
    let username = verified["user"]["username"].as_str().unwrap();

    let response = ctx.login(username, test_password()).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["user"]["email"], email.as_str());
}

#[tokio::test]
async fn login_accepts_email_field_alias() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;

    let response = ctx
        .server
        .post("/api/accounts/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn login_with_wrong_password_returns_401() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;

    let response = ctx.login(&email, "WrongPassword123!").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "Invalid login or password.");
}

#[tokio::test]
async fn login_with_unknown_user_returns_401() {
    let ctx = TestContext::new();

    ctx.login(&test_email(), test_password())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    ctx.login("nobody_here", test_password())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_before_verification_returns_401() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register(&email).await;

    ctx.login(&email, test_password())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_to_inactive_account_returns_403() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;
    ctx.store.set_user_active(&email, false);

    ctx.login(&email, test_password())
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_with_missing_fields_returns_400() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/accounts/login")
        .json(&json!({ "login": test_email() }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_endpoint_returns_bare_pair() {
    let ctx = TestContext::new();
    let email = test_email();
    ctx.register_and_verify(&email).await;

    let response = ctx
        .server
        .post("/api/accounts/token")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["access"].as_str().is_some());
    assert!(body["refresh"].as_str().is_some());
    assert!(body.get("user").is_none());
}
