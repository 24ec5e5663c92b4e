use axum::http::StatusCode;
use commerce_api::modules::accounts::AccountService;
use serde_json::{json, Value};

use crate::common::{test_email, test_password, TestContext};

#[tokio::test]
async fn profile_returns_current_user() {
    let ctx = TestContext::new();
    let (email, access_token, _) = ctx.create_and_login().await;

    let response = ctx
        .server
        .get("/api/accounts/profile")
        .authorization_bearer(&access_token)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["email"], email.as_str());
    assert!(body["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn profile_without_token_returns_401() {
    let ctx = TestContext::new();

    let response = ctx.server.get("/api/accounts/profile").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "Authentication credentials were not provided.");
}

#[tokio::test]
async fn profile_with_invalid_token_returns_401() {
    let ctx = TestContext::new();

    ctx.server
        .get("/api/accounts/profile")
        .authorization_bearer("invalid.token.here")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn patch_updates_only_given_fields() {
    let ctx = TestContext::new();
    let (_, access_token, _) = ctx.create_and_login().await;

    let response = ctx
        .server
        .patch("/api/accounts/profile")
        .authorization_bearer(&access_token)
        .json(&json!({
            "last_name": "Iyer",
            "mobile_no": "9123456780",
            "pin_code": "560001"
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["first_name"], "Asha");
    assert_eq!(body["data"]["last_name"], "Iyer");
    assert_eq!(body["data"]["mobile_no"], "9123456780");
    assert_eq!(body["data"]["pin_code"], "560001");

    let fetched: Value = ctx
        .server
        .get("/api/accounts/profile")
        .authorization_bearer(&access_token)
        .await
        .json();
    assert_eq!(fetched["data"]["last_name"], "Iyer");
}

#[tokio::test]
async fn put_rejects_malformed_pin_code() {
    let ctx = TestContext::new();
    let (_, access_token, _) = ctx.create_and_login().await;

    ctx.server
        .put("/api/accounts/profile")
        .authorization_bearer(&access_token)
        .json(&json!({ "pin_code": "12ab" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mobile_taken_by_another_user_returns_400() {
    let ctx = TestContext::new();
    let (_, access_a, _) = ctx.create_and_login().await;
    let (_, access_b, _) = ctx.create_and_login().await;

    ctx.server
        .patch("/api/accounts/profile")
        .authorization_bearer(&access_a)
        .json(&json!({ "mobile_no": "9000000001" }))
        .await
        .assert_status_ok();

    ctx.server
        .patch("/api/accounts/profile")
        .authorization_bearer(&access_b)
        .json(&json!({ "mobile_no": "9000000001" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // Re-saving your own number is fine.
    ctx.server
        .patch("/api/accounts/profile")
        .authorization_bearer(&access_a)
        .json(&json!({ "mobile_no": "9000000001" }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn mobile_held_by_pending_registration_returns_400() {
    let ctx = TestContext::new();
    let (_, access_token, _) = ctx.create_and_login().await;
    ctx.server
        .post("/api/accounts/register")
        .json(&json!({
            "email": test_email(),
            "password": test_password(),
            "password2": test_password(),
            "mobile_no": "9000000002"
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = ctx
        .server
        .patch("/api/accounts/profile")
        .authorization_bearer(&access_token)
        .json(&json!({ "mobile_no": "9000000002" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "This mobile number is already in use.");
}

#[tokio::test]
async fn blank_values_clear_mobile_and_pin_code() {
    let ctx = TestContext::new();
    let (_, access_token, _) = ctx.create_and_login().await;
    ctx.server
        .patch("/api/accounts/profile")
        .authorization_bearer(&access_token)
        .json(&json!({ "mobile_no": "9000000003", "pin_code": "560001" }))
        .await
        .assert_status_ok();

    let response = ctx
        .server
        .patch("/api/accounts/profile")
        .authorization_bearer(&access_token)
        .json(&json!({ "mobile_no": "", "pin_code": "" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["data"]["mobile_no"].is_null());
    assert!(body["data"]["pin_code"].is_null());
}

#[tokio::test]
async fn user_list_requires_staff() {
    let ctx = TestContext::new();
    let (_, access_token, _) = ctx.create_and_login().await;

    ctx.server
        .get("/api/accounts/users")
        .authorization_bearer(&access_token)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    ctx.server
        .get("/api/accounts/users")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn staff_can_list_users() {
    let ctx = TestContext::new();
    ctx.create_and_login().await;

    let admin_email = test_email();
    let admin = AccountService::new(&ctx.state)
        .create_superuser(&admin_email, test_password())
        .await
        .unwrap();
    assert!(admin.is_staff);

    let body: Value = ctx.login(&admin_email, test_password()).await.json();
    let response = ctx
        .server
        .get("/api/accounts/users")
        .authorization_bearer(body["access"].as_str().unwrap())
        .await;

    response.assert_status_ok();
    let users: Value = response.json();
    assert_eq!(users.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn creating_duplicate_superuser_fails() {
    let ctx = TestContext::new();
    let email = test_email();
    let service = AccountService::new(&ctx.state);

    service.create_superuser(&email, test_password()).await.unwrap();
    assert!(service.create_superuser(&email, test_password()).await.is_err());
}
