use axum::http::{header, HeaderValue, StatusCode};
use serde_json::{json, Value};

use crate::common::TestContext;

#[tokio::test]
async fn logout_with_valid_tokens_returns_success() {
    let ctx = TestContext::new();
    let (_, access_token, refresh_token) = ctx.create_and_login().await;

    let response = ctx
        .server
        .post("/api/accounts/logout")
        .authorization_bearer(&access_token)
        .json(&json!({ "refresh": &refresh_token }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "success");

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("refresh_token=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn access_token_is_rejected_after_logout() {
    let ctx = TestContext::new();
    let (_, access_token, refresh_token) = ctx.create_and_login().await;

    ctx.server
        .post("/api/accounts/logout")
        .authorization_bearer(&access_token)
        .json(&json!({ "refresh": &refresh_token }))
        .await
        .assert_status_ok();

    let response = ctx
        .server
        .get("/api/accounts/profile")
        .authorization_bearer(&access_token)
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "This access token has been blacklisted.");
}

#[tokio::test]
async fn refresh_token_cannot_be_used_after_logout() {
    let ctx = TestContext::new();
    let (_, access_token, refresh_token) = ctx.create_and_login().await;

    ctx.server
        .post("/api/accounts/logout")
        .authorization_bearer(&access_token)
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
async fn logout_reads_refresh_token_from_cookie() {
    let ctx = TestContext::new();
    let (_, access_token, refresh_token) = ctx.create_and_login().await;

    let response = ctx
        .server
        .post("/api/accounts/logout")
        .authorization_bearer(&access_token)
        .add_header(
            header::COOKIE,
            HeaderValue::from_str(&format!("refresh_token={}", refresh_token)).unwrap(),
        )
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn logout_without_refresh_token_returns_400() {
    let ctx = TestContext::new();
    let (_, access_token, _) = ctx.create_and_login().await;

    ctx.server
        .post("/api/accounts/logout")
        .authorization_bearer(&access_token)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_with_garbage_refresh_still_blacklists_access() {
    let ctx = TestContext::new();
    let (_, access_token, _) = ctx.create_and_login().await;

    let response = ctx
        .server
        .post("/api/accounts/logout")
        .authorization_bearer(&access_token)
        .json(&json!({ "refresh": "not.a.token" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "info");

    ctx.server
        .get("/api/accounts/profile")
        .authorization_bearer(&access_token)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_cannot_revoke_another_users_refresh_token() {
    let ctx = TestContext::new();
    let (_, access_a, _) = ctx.create_and_login().await;
    let (_, _, refresh_b) = ctx.create_and_login().await;

    let response = ctx
        .server
        .post("/api/accounts/logout")
        .authorization_bearer(&access_a)
        .json(&json!({ "refresh": &refresh_b }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "info");

    ctx.server
        .post("/api/accounts/token/refresh")
        .json(&json!({ "refresh": &refresh_b }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn logout_without_access_token_returns_401() {
    let ctx = TestContext::new();
    let (_, _, refresh_token) = ctx.create_and_login().await;

    ctx.server
        .post("/api/accounts/logout")
        .json(&json!({ "refresh": &refresh_token }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
