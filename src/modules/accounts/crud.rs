use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};

use super::interface::{
    AuthError, OtpRepository, PendingUserRepository, Result, TokenBlacklistRepository,
    UserRepository,
};
use super::model::{BlacklistedToken, EmailOtp, OtpPurpose, PendingUser, User};

/// MySQL-backed implementation of every account repository.
#[derive(Clone)]
pub struct MySqlAccountStore {
    pool: Pool<MySql>,
}

impl MySqlAccountStore {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

/// Maps a unique-key violation on `users` to the matching client error.
fn user_write_error(err: sqlx::Error) -> AuthError {
    let violated = err
        .as_database_error()
        .filter(|db| db.is_unique_violation())
        .map(|db| db.message().to_string());

    match violated {
        Some(key) if key.contains("uq_users_mobile_no") => AuthError::MobileAlreadyExists,
        Some(key) if key.contains("uq_users_email") => AuthError::EmailAlreadyExists,
        _ => AuthError::Database(err),
    }
}

#[async_trait]
impl UserRepository for MySqlAccountStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name, mobile_no,
                               address, pin_code, is_staff, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.mobile_no)
        .bind(&user.address)
        .bind(&user.pin_code)
        .bind(user.is_staff)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(user_write_error)?;

        Ok(())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER(?)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(username) = LOWER(?)")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE LOWER(username) = LOWER(?)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;

        Ok(result.0 > 0)
    }

    async fn mobile_in_use(&self, mobile_no: &str, except_user_id: Option<&str>) -> Result<bool> {
        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE mobile_no = ? AND (? IS NULL OR id <> ?)",
        )
        .bind(mobile_no)
        .bind(except_user_id)
        .bind(except_user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.0 > 0)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?)
    }

    // A duplicate mobile or email aborts before commit, so the pending row survives.
    async fn promote_pending(&self, pending: &PendingUser, user: &User) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM pending_users WHERE id = ?")
            .bind(&pending.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name, mobile_no,
                               address, pin_code, is_staff, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.mobile_no)
        .bind(&user.address)
        .bind(&user.pin_code)
        .bind(user.is_staff)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(user_write_error)?;

        tx.commit().await?;
        Ok(true)
    }

    async fn update_profile(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET first_name = ?, last_name = ?, mobile_no = ?, address = ?, pin_code = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.mobile_no)
        .bind(&user.address)
        .bind(&user.pin_code)
        .bind(user.updated_at)
        .bind(&user.id)
        .execute(&self.pool)
        .await
        .map_err(user_write_error)?;

        Ok(())
    }

    async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl PendingUserRepository for MySqlAccountStore {
    async fn upsert_pending(&self, pending: &PendingUser) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_users (id, email, password_hash, first_name, last_name, mobile_no,
                                       address, pin_code, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                id = VALUES(id),
                password_hash = VALUES(password_hash),
                first_name = VALUES(first_name),
                last_name = VALUES(last_name),
                mobile_no = VALUES(mobile_no),
                address = VALUES(address),
                pin_code = VALUES(pin_code),
                created_at = VALUES(created_at)
            "#,
        )
        .bind(&pending.id)
        .bind(&pending.email)
        .bind(&pending.password_hash)
        .bind(&pending.first_name)
        .bind(&pending.last_name)
        .bind(&pending.mobile_no)
        .bind(&pending.address)
        .bind(&pending.pin_code)
        .bind(pending.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_pending(&self, email: &str) -> Result<Option<PendingUser>> {
        Ok(
            sqlx::query_as::<_, PendingUser>("SELECT * FROM pending_users WHERE LOWER(email) = LOWER(?)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn pending_mobile_in_use(&self, mobile_no: &str, except_email: &str) -> Result<bool> {
        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pending_users WHERE mobile_no = ? AND LOWER(email) <> LOWER(?)",
        )
        .bind(mobile_no)
        .bind(except_email)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.0 > 0)
    }

    async fn delete_pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_users WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OtpRepository for MySqlAccountStore {
    async fn insert_otp(&self, otp: &EmailOtp) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO email_otps (id, user_id, email, code, purpose, created_at, expires_at, attempts, is_used)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&otp.id)
        .bind(&otp.user_id)
        .bind(&otp.email)
        .bind(&otp.code)
        .bind(&otp.purpose)
        .bind(otp.created_at)
        .bind(otp.expires_at)
        .bind(otp.attempts)
        .bind(otp.is_used)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Option<EmailOtp>> {
        Ok(sqlx::query_as::<_, EmailOtp>(
            r#"
            SELECT * FROM email_otps
            WHERE LOWER(email) = LOWER(?) AND purpose = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn latest_unused_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Option<EmailOtp>> {
        Ok(sqlx::query_as::<_, EmailOtp>(
            r#"
            SELECT * FROM email_otps
            WHERE LOWER(email) = LOWER(?) AND purpose = ? AND is_used = FALSE
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn record_failed_attempt(&self, id: &str) -> Result<u32> {
        sqlx::query("UPDATE email_otps SET attempts = attempts + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let attempts: (u32,) = sqlx::query_as("SELECT attempts FROM email_otps WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(attempts.0)
    }

    async fn mark_otp_used(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE email_otps SET is_used = TRUE WHERE id = ? AND is_used = FALSE")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_otp(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM email_otps WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_otps(&self, email: &str, purpose: Option<OtpPurpose>) -> Result<u64> {
        let result = match purpose {
            Some(purpose) => {
                sqlx::query("DELETE FROM email_otps WHERE LOWER(email) = LOWER(?) AND purpose = ?")
                    .bind(email)
                    .bind(purpose.as_str())
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM email_otps WHERE LOWER(email) = LOWER(?)")
                    .bind(email)
                    .execute(&self.pool)
                    .await?
            }
        };

        Ok(result.rows_affected())
    }

    async fn delete_expired_otps(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM email_otps WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TokenBlacklistRepository for MySqlAccountStore {
    async fn blacklist_token(&self, token: &BlacklistedToken) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO blacklisted_tokens (jti, token_type, user_id, expires_at, blacklisted_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token.jti)
        .bind(&token.token_type)
        .bind(&token.user_id)
        .bind(token.expires_at)
        .bind(token.blacklisted_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blacklisted_tokens WHERE jti = ?")
            .bind(jti)
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0 > 0)
    }

    async fn delete_expired_blacklist(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM blacklisted_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
