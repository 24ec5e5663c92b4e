use commerce_api::config::{init_db, run_migrations, Config, EmailBackend};
use commerce_api::modules::accounts::{AccountService, AuthError, MySqlAccountStore};
use commerce_api::services::jwt::JwtService;
use commerce_api::services::mailer::{ConsoleMailer, Mailer, SmtpMailer};
use commerce_api::services::metrics::MetricsRegistry;
use commerce_api::AppState;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "commerce_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let db = init_db(&config.database_url).await?;
    tracing::info!("Connected to MySQL");
    run_migrations(&db).await?;
    tracing::info!("Migrations applied");

    let mailer: Arc<dyn Mailer> = match config.email.backend {
        EmailBackend::Console => Arc::new(ConsoleMailer),
        EmailBackend::Smtp => Arc::new(SmtpMailer::new(&config.email)?),
    };

    let jwt_service = JwtService::new(config.jwt_secret.expose_secret().to_string())
        .with_lifetimes(config.auth.access_token_ttl, config.auth.refresh_token_ttl);

    let state = Arc::new(AppState {
        store: Arc::new(MySqlAccountStore::new(db)),
        jwt_service,
        mailer,
        settings: config.auth.clone(),
        metrics: MetricsRegistry::new()?,
    });

    if let Some(admin) = &config.admin {
        match AccountService::new(&state)
            .create_superuser(&admin.email, admin.password.expose_secret())
            .await
        {
            Ok(user) => tracing::info!(email = %user.email, "seeded admin account"),
            Err(AuthError::EmailAlreadyExists) => tracing::debug!("admin account already present"),
            Err(e) => return Err(e.into()),
        }
    }

    spawn_purge_task(state.clone());

    let app = commerce_api::create_app(state, config.rate_limit_per_minute);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_purge_task(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = AccountService::new(&state).purge_expired().await {
                tracing::warn!(error = %e, "purge of expired account rows failed");
            }
        }
    });
}
