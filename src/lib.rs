pub mod config;
pub mod modules;
pub mod services;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use config::AuthSettings;
use modules::accounts::{account_routes, AccountRepository};
use modules::metrics::metrics_routes;
use services::jwt::JwtService;
use services::mailer::Mailer;
use services::metrics::{metrics_middleware, MetricsRegistry};
use services::rate_limit::{create_rate_limiter, RateLimitLayer};
use services::security::security_headers;

pub struct AppState {
    pub store: Arc<dyn AccountRepository>,
    pub jwt_service: JwtService,
    pub mailer: Arc<dyn Mailer>,
    pub settings: AuthSettings,
    pub metrics: Arc<MetricsRegistry>,
}

pub fn create_app(state: Arc<AppState>, rate_limit_per_minute: u32) -> Router {
    let metrics = state.metrics.clone();
    let rate_limiter = create_rate_limiter(rate_limit_per_minute);

    Router::new()
        .route("/", get(root))
        .merge(metrics_routes())
        .nest("/api/accounts", account_routes())
        .layer(middleware::from_fn(security_headers))
        .layer(RequestBodyLimitLayer::new(1024 * 64))
        .layer(RateLimitLayer::new(rate_limiter))
        .layer(middleware::from_fn_with_state(metrics, metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Commerce API"
}
