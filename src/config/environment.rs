use chrono::Duration;
use secrecy::SecretString;
use std::env;
use std::str::FromStr;

/// Environment configuration
/// Loads and validates environment variables
pub struct Config {
    pub database_url: String,
    pub jwt_secret: SecretString,
    pub bind_addr: String,
    pub rate_limit_per_minute: u32,
    pub auth: AuthSettings,
    pub email: EmailSettings,
    pub admin: Option<AdminSeed>,
}

/// Timing and cookie knobs for the account flows.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub otp_ttl: Duration,
    pub otp_cooldown: Duration,
    pub otp_max_attempts: u32,
    pub pending_user_ttl: Duration,
    pub cookie_secure: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::seconds(60),
            refresh_token_ttl: Duration::days(1),
            otp_ttl: Duration::minutes(10),
            otp_cooldown: Duration::seconds(60),
            otp_max_attempts: 5,
            pending_user_ttl: Duration::hours(24),
            cookie_secure: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailBackend {
    /// Writes messages to the log instead of delivering them.
    Console,
    Smtp,
}

pub struct EmailSettings {
    pub backend: EmailBackend,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from_address: String,
}

pub struct AdminSeed {
    pub email: String,
    pub password: SecretString,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| "JWT_SECRET must be set".to_string())?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let rate_limit_per_minute = parse_var("RATE_LIMIT_PER_MINUTE", 120)?;

        let defaults = AuthSettings::default();
        let auth = AuthSettings {
            access_token_ttl: Duration::seconds(parse_var(
                "ACCESS_TOKEN_TTL_SECS",
                defaults.access_token_ttl.num_seconds(),
            )?),
            refresh_token_ttl: Duration::seconds(parse_var(
                "REFRESH_TOKEN_TTL_SECS",
                defaults.refresh_token_ttl.num_seconds(),
            )?),
            otp_ttl: Duration::minutes(parse_var("OTP_TTL_MINUTES", defaults.otp_ttl.num_minutes())?),
            otp_cooldown: Duration::seconds(parse_var(
                "OTP_COOLDOWN_SECS",
                defaults.otp_cooldown.num_seconds(),
            )?),
            otp_max_attempts: parse_var("OTP_MAX_ATTEMPTS", defaults.otp_max_attempts)?,
            pending_user_ttl: Duration::hours(parse_var(
                "PENDING_USER_TTL_HOURS",
                defaults.pending_user_ttl.num_hours(),
            )?),
            cookie_secure: parse_var("AUTH_COOKIE_SECURE", defaults.cookie_secure)?,
        };

        let backend = match env::var("EMAIL_BACKEND").as_deref() {
            Ok("smtp") => EmailBackend::Smtp,
            Ok("console") | Err(_) => EmailBackend::Console,
            Ok(other) => return Err(format!("Unknown EMAIL_BACKEND: {}", other)),
        };
        let username = env::var("EMAIL_HOST_USER").ok();
        let from_address = env::var("DEFAULT_FROM_EMAIL")
            .ok()
            .or_else(|| username.clone())
            .unwrap_or_else(|| "noreply@localhost".to_string());
        let email = EmailSettings {
            backend,
            host: env::var("EMAIL_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            port: parse_var("EMAIL_PORT", 587)?,
            username,
            password: env::var("EMAIL_HOST_PASSWORD").ok().map(SecretString::from),
            from_address,
        };
        if email.backend == EmailBackend::Smtp && (email.username.is_none() || email.password.is_none()) {
            return Err("EMAIL_HOST_USER and EMAIL_HOST_PASSWORD must be set for the smtp backend".to_string());
        }

        let admin = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminSeed {
                email,
                password: SecretString::from(password),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret: SecretString::from(jwt_secret),
            bind_addr,
            rate_limit_per_minute,
            auth,
            email,
            admin,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}
