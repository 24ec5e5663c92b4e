//! In-process implementation of the account repositories.
//!
//! Backs the integration tests and local runs without MySQL. A single mutex
//! guards all tables, which makes `promote_pending` and `mark_otp_used` atomic
//! the same way the MySQL statements are.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::interface::{
    AuthError, OtpRepository, PendingUserRepository, Result, TokenBlacklistRepository,
    UserRepository,
};
use super::model::{BlacklistedToken, EmailOtp, OtpPurpose, PendingUser, User};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    pending: Vec<PendingUser>,
    // Insertion order doubles as creation order for equal timestamps.
    otps: Vec<EmailOtp>,
    blacklist: HashMap<String, BlacklistedToken>,
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    tables: Mutex<Tables>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AuthError::Internal("account store lock poisoned".to_string()))
    }

    /// Moves every OTP for the pair `by` into the past. Test hook for expiry
    /// and cooldown behaviour.
    pub fn age_otps(&self, email: &str, purpose: OtpPurpose, by: Duration) {
        if let Ok(mut tables) = self.tables() {
            for otp in tables
                .otps
                .iter_mut()
                .filter(|otp| same_email(&otp.email, email) && otp.purpose == purpose.as_str())
            {
                otp.created_at -= by;
                otp.expires_at -= by;
            }
        }
    }

    /// Moves a pending registration into the past.
    pub fn age_pending(&self, email: &str, by: Duration) {
        if let Ok(mut tables) = self.tables() {
            for pending in tables.pending.iter_mut().filter(|p| same_email(&p.email, email)) {
                pending.created_at -= by;
            }
        }
    }

    pub fn otp_count(&self, email: &str, purpose: OtpPurpose) -> usize {
        self.tables()
            .map(|tables| {
                tables
                    .otps
                    .iter()
                    .filter(|otp| same_email(&otp.email, email) && otp.purpose == purpose.as_str())
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn pending_count(&self) -> usize {
        self.tables().map(|tables| tables.pending.len()).unwrap_or(0)
    }

    pub fn user_count(&self) -> usize {
        self.tables().map(|tables| tables.users.len()).unwrap_or(0)
    }

    pub fn set_user_active(&self, email: &str, active: bool) {
        if let Ok(mut tables) = self.tables() {
            for user in tables.users.iter_mut().filter(|u| same_email(&u.email, email)) {
                user.is_active = active;
            }
        }
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

// Mirrors the unique key on users.mobile_no.
fn mobile_taken(users: &[User], mobile_no: Option<&str>, owner_id: &str) -> bool {
    mobile_no.is_some_and(|mobile| {
        users
            .iter()
            .any(|u| u.mobile_no.as_deref() == Some(mobile) && u.id != owner_id)
    })
}

fn latest<'a>(otps: impl Iterator<Item = &'a EmailOtp>) -> Option<&'a EmailOtp> {
    // max_by_key keeps the last of equal elements, i.e. the newest insert.
    otps.max_by_key(|otp| otp.created_at)
}

#[async_trait]
impl UserRepository for InMemoryAccountStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables()?;
        if tables.users.iter().any(|u| same_email(&u.email, &user.email)) {
            return Err(AuthError::EmailAlreadyExists);
        }
        tables.users.push(user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.tables()?.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .tables()?
            .users
            .iter()
            .find(|u| same_email(&u.email, email))
            .cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .tables()?
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self
            .tables()?
            .users
            .iter()
            .any(|u| u.username.eq_ignore_ascii_case(username)))
    }

    async fn mobile_in_use(&self, mobile_no: &str, except_user_id: Option<&str>) -> Result<bool> {
        Ok(self.tables()?.users.iter().any(|u| {
            u.mobile_no.as_deref() == Some(mobile_no) && Some(u.id.as_str()) != except_user_id
        }))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users = self.tables()?.users.clone();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn promote_pending(&self, pending: &PendingUser, user: &User) -> Result<bool> {
        let mut tables = self.tables()?;
        let Some(index) = tables.pending.iter().position(|p| p.id == pending.id) else {
            return Ok(false);
        };
        if tables.users.iter().any(|u| same_email(&u.email, &user.email)) {
            return Err(AuthError::EmailAlreadyExists);
        }
        if mobile_taken(&tables.users, user.mobile_no.as_deref(), &user.id) {
            return Err(AuthError::MobileAlreadyExists);
        }
        tables.pending.remove(index);
        tables.users.push(user.clone());
        Ok(true)
    }

    async fn update_profile(&self, user: &User) -> Result<()> {
        let mut tables = self.tables()?;
        if mobile_taken(&tables.users, user.mobile_no.as_deref(), &user.id) {
            return Err(AuthError::MobileAlreadyExists);
        }
        if let Some(existing) = tables.users.iter_mut().find(|u| u.id == user.id) {
            existing.first_name = user.first_name.clone();
            existing.last_name = user.last_name.clone();
            existing.mobile_no = user.mobile_no.clone();
            existing.address = user.address.clone();
            existing.pin_code = user.pin_code.clone();
            existing.updated_at = user.updated_at;
        }
        Ok(())
    }

    async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let mut tables = self.tables()?;
        if let Some(existing) = tables.users.iter_mut().find(|u| u.id == user_id) {
            existing.password_hash = password_hash.to_string();
            existing.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl PendingUserRepository for InMemoryAccountStore {
    async fn upsert_pending(&self, pending: &PendingUser) -> Result<()> {
        let mut tables = self.tables()?;
        tables.pending.retain(|p| !same_email(&p.email, &pending.email));
        tables.pending.push(pending.clone());
        Ok(())
    }

    async fn find_pending(&self, email: &str) -> Result<Option<PendingUser>> {
        Ok(self
            .tables()?
            .pending
            .iter()
            .find(|p| same_email(&p.email, email))
            .cloned())
    }

    async fn pending_mobile_in_use(&self, mobile_no: &str, except_email: &str) -> Result<bool> {
        Ok(self.tables()?.pending.iter().any(|p| {
            p.mobile_no.as_deref() == Some(mobile_no) && !same_email(&p.email, except_email)
        }))
    }

    async fn delete_pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables()?;
        let before = tables.pending.len();
        tables.pending.retain(|p| p.created_at >= cutoff);
        Ok((before - tables.pending.len()) as u64)
    }
}

#[async_trait]
impl OtpRepository for InMemoryAccountStore {
    async fn insert_otp(&self, otp: &EmailOtp) -> Result<()> {
        self.tables()?.otps.push(otp.clone());
        Ok(())
    }

    async fn latest_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Option<EmailOtp>> {
        let tables = self.tables()?;
        Ok(latest(
            tables
                .otps
                .iter()
                .filter(|otp| same_email(&otp.email, email) && otp.purpose == purpose.as_str()),
        )
        .cloned())
    }

    async fn latest_unused_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Option<EmailOtp>> {
        let tables = self.tables()?;
        Ok(latest(tables.otps.iter().filter(|otp| {
            same_email(&otp.email, email) && otp.purpose == purpose.as_str() && !otp.is_used
        }))
        .cloned())
    }

    async fn record_failed_attempt(&self, id: &str) -> Result<u32> {
        let mut tables = self.tables()?;
        let otp = tables
            .otps
            .iter_mut()
            .find(|otp| otp.id == id)
            .ok_or(AuthError::InvalidOtp)?;
        otp.attempts += 1;
        Ok(otp.attempts)
    }

    async fn mark_otp_used(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables()?;
        match tables.otps.iter_mut().find(|otp| otp.id == id && !otp.is_used) {
            Some(otp) => {
                otp.is_used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_otp(&self, id: &str) -> Result<()> {
        self.tables()?.otps.retain(|otp| otp.id != id);
        Ok(())
    }

    async fn delete_otps(&self, email: &str, purpose: Option<OtpPurpose>) -> Result<u64> {
        let mut tables = self.tables()?;
        let before = tables.otps.len();
        tables.otps.retain(|otp| {
            let matches = same_email(&otp.email, email)
                && purpose.map_or(true, |p| otp.purpose == p.as_str());
            !matches
        });
        Ok((before - tables.otps.len()) as u64)
    }

    async fn delete_expired_otps(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables()?;
        let before = tables.otps.len();
        tables.otps.retain(|otp| !otp.is_expired_at(now));
        Ok((before - tables.otps.len()) as u64)
    }
}

#[async_trait]
impl TokenBlacklistRepository for InMemoryAccountStore {
    async fn blacklist_token(&self, token: &BlacklistedToken) -> Result<bool> {
        let mut tables = self.tables()?;
        if tables.blacklist.contains_key(&token.jti) {
            return Ok(false);
        }
        tables.blacklist.insert(token.jti.clone(), token.clone());
        Ok(true)
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool> {
        Ok(self.tables()?.blacklist.contains_key(jti))
    }

    async fn delete_expired_blacklist(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables()?;
        let before = tables.blacklist.len();
        tables.blacklist.retain(|_, token| token.expires_at > now);
        Ok((before - tables.blacklist.len()) as u64)
    }
}
