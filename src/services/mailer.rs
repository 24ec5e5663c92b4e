//! Outbound email for OTP delivery.
//!
//! `SmtpMailer` talks to a STARTTLS relay via lettre, `ConsoleMailer` logs the
//! message instead (the development default) and `MemoryMailer` keeps every
//! message so tests can read the codes back.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use std::sync::Mutex;

use crate::config::EmailSettings;
use crate::modules::accounts::model::OtpPurpose;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Mail backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

/// Builds the OTP message for a purpose.
pub fn otp_email(to: &str, code: &str, purpose: OtpPurpose, ttl_minutes: i64) -> OutgoingEmail {
    let subject = match purpose {
        OtpPurpose::Registration => "Your OTP Code",
        OtpPurpose::Login => "Your Login OTP",
        OtpPurpose::PasswordReset => "Password Reset OTP",
    };
    let body = format!(
        "Hello,\n\nYour OTP is: {code}.\nIt will expire in {ttl_minutes} minutes.\n\n\
         If you did not request this code you can ignore this email.\n"
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: subject.to_string(),
        body,
    }
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings) -> Result<Self, MailError> {
        let from: Mailbox = settings
            .from_address
            .parse()
            .map_err(|_| MailError::InvalidAddress(settings.from_address.clone()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.to.clone()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)?;

        self.transport.send(message).await?;
        tracing::debug!(to = %email.to, "OTP email delivered");
        Ok(())
    }
}

pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "console mail backend:\n{}",
            email.body
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<OutgoingEmail>>,
    failing: Mutex<bool>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().map(|outbox| outbox.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, to: &str) -> Vec<OutgoingEmail> {
        self.sent()
            .into_iter()
            .filter(|email| email.to.eq_ignore_ascii_case(to))
            .collect()
    }

    /// The six-digit code from the newest message sent to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent_to(to).last().and_then(|email| extract_code(&email.body))
    }

    /// Makes every following `send` fail, simulating a dead relay.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let failing = self.failing.lock().map(|flag| *flag).unwrap_or(false);
        if failing {
            return Err(MailError::Unavailable("memory mailer set to fail".to_string()));
        }
        self.outbox
            .lock()
            .map_err(|_| MailError::Unavailable("outbox lock poisoned".to_string()))?
            .push(email);
        Ok(())
    }
}

fn extract_code(body: &str) -> Option<String> {
    body.split(|c: char| !c.is_ascii_digit())
        .find(|chunk| chunk.len() == crate::services::otp::OTP_LENGTH)
        .map(str::to_string)
}
