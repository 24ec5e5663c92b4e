use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // user id
    pub email: String,
    pub exp: i64,           // expiration time
    pub iat: i64,           // issued at
    pub jti: String,        // unique token id
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,        // user id
    pub exp: i64,
    pub iat: i64,
    pub jti: String,        // unique token id
    pub token_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("wrong token type: expected {expected}")]
    WrongTokenType { expected: &'static str },

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Both halves of a freshly issued login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_jti: String,
    pub refresh_jti: String,
}

pub struct JwtService {
    secret: String,
    access_token_duration: Duration,
    refresh_token_duration: Duration,
}

impl JwtService {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            access_token_duration: Duration::seconds(60),
            refresh_token_duration: Duration::days(1),
        }
    }

    pub fn with_lifetimes(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_token_duration = access;
        self.refresh_token_duration = refresh;
        self
    }

    pub fn create_access_token(&self, user_id: &str, email: &str) -> Result<(String, Claims), JwtError> {
        let now = Utc::now();
        let exp = now + self.access_token_duration;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok((token, claims))
    }

    pub fn create_refresh_token(&self, user_id: &str) -> Result<(String, RefreshClaims), JwtError> {
        let now = Utc::now();
        let exp = now + self.refresh_token_duration;

        let claims = RefreshClaims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok((token, claims))
    }

    pub fn issue_pair(&self, user_id: &str, email: &str) -> Result<TokenPair, JwtError> {
        let (access_token, access) = self.create_access_token(user_id, email)?;
        let (refresh_token, refresh) = self.create_refresh_token(user_id)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_jti: access.jti,
            refresh_jti: refresh.jti,
        })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<TokenData<Claims>, JwtError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        if data.claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(JwtError::WrongTokenType { expected: ACCESS_TOKEN_TYPE });
        }
        Ok(data)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<TokenData<RefreshClaims>, JwtError> {
        let data = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        if data.claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(JwtError::WrongTokenType { expected: REFRESH_TOKEN_TYPE });
        }
        Ok(data)
    }

    pub fn get_refresh_token_duration_secs(&self) -> i64 {
        self.refresh_token_duration.num_seconds()
    }
}

/// Converts a JWT `exp` claim to a timestamp, clamping garbage to now.
pub fn expiry_to_datetime(exp: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(exp, 0).single().unwrap_or_else(Utc::now)
}
