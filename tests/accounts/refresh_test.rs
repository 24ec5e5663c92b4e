use axum::http::{header, HeaderValue, StatusCode};
use serde_json::{json, Value};

use crate::common::TestContext;

#[tokio::test]
async fn refresh_rotates_the_token_pair() {
    let ctx = TestContext::new();
    let (_, _, refresh_token) = ctx.create_and_login().await;

    let response = ctx
        .server
        .post("/api/accounts/token/refresh")
        .json(&json!({ "refresh": &refresh_token }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let new_refresh = body["refresh"].as_str().unwrap();
    assert_ne!(new_refresh, refresh_token);
    assert!(body["access"].as_str().is_some());

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(&format!("refresh_token={};", new_refresh)));
}

#[tokio::test]
async fn rotated_refresh_token_is_rejected() {
    let ctx = TestContext::new();
    let (_, _, refresh_token) = ctx.create_and_login().await;

    ctx.server
        .post("/api/accounts/token/refresh")
        .json(&json!({ "refresh": &refresh_token }))
        .await
        .assert_status_ok();

    ctx.server
        .post("/api/accounts/token/refresh")
        .json(&json!({ "refresh": &refresh_token }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn new_access_token_works_for_profile() {
    let ctx = TestContext::new();
    let (email, _, refresh_token) = ctx.create_and_login().await;

    let body: Value = ctx
        .server
        .post("/api/accounts/token/refresh")
        .json(&json!({ "refresh": &refresh_token }))
        .await
        .json();

    let response = ctx
        .server
        .get("/api/accounts/profile")
        .authorization_bearer(body["access"].as_str().unwrap())
        .await;

    response.assert_status_ok();
    let profile: Value = response.json();
    assert_eq!(profile["data"]["email"], email.as_str());
}

#[tokio::test]
async fn cookie_takes_precedence_over_body() {
    let ctx = TestContext::new();
    let (_, _, refresh_token) = ctx.create_and_login().await;

    let response = ctx
        .server
        .post("/api/accounts/token/refresh")
        .add_header(
            header::COOKIE,
            HeaderValue::from_str(&format!("refresh_token={}", refresh_token)).unwrap(),
        )
        .json(&json!({ "refresh": "ignored.because.cookie" }))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn refresh_without_token_returns_401() {
    let ctx = TestContext::new();

    ctx.server
        .post("/api/accounts/token/refresh")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn access_token_cannot_be_used_as_refresh() {
    let ctx = TestContext::new();
    let (_, access_token, _) = ctx.create_and_login().await;

    ctx.server
        .post("/api/accounts/token/refresh")
        .json(&json!({ "refresh": &access_token }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_for_deactivated_user_returns_401() {
    let ctx = TestContext::new();
    let (email, _, refresh_token) = ctx.create_and_login().await;
    ctx.store.set_user_active(&email, false);

    ctx.server
        .post("/api/accounts/token/refresh")
        .json(&json!({ "refresh": &refresh_token }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_cannot_authenticate_requests() {
    let ctx = TestContext::new();
    let (_, _, refresh_token) = ctx.create_and_login().await;

    ctx.server
        .get("/api/accounts/profile")
        .authorization_bearer(&refresh_token)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
