use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::AppState;
use super::controller;

pub fn account_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(controller::api_root))
        .route("/register", post(controller::register))
        .route("/otp/verify", post(controller::verify_otp))
        .route("/otp/resend", post(controller::resend_otp))
        .route("/login", post(controller::login))
        .route("/login/otp/request", post(controller::request_login_otp))
        .route("/login/otp/verify", post(controller::verify_login_otp))
        .route("/logout", post(controller::logout))
        .route(
            "/profile",
            get(controller::get_profile)
                .put(controller::update_profile)
                .patch(controller::update_profile),
        )
        .route("/users", get(controller::list_users))
        .route("/password/forgot", post(controller::forgot_password))
        .route("/password/verify-otp", post(controller::verify_reset_otp))
        .route("/password/reset", post(controller::reset_password))
        .route("/token", post(controller::obtain_token))
        .route("/token/refresh", post(controller::refresh_token))
}
