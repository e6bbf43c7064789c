//! Mail delivery backends.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::OutgoingMail;
use crate::config::Mail;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("mail rejected: {0}")]
    Rejected(String),
}

/// Deliver one mail.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// SMTP relay.
pub struct SmtpTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpTransport {
    /// Create a new [`SmtpTransport`].
    pub fn new(config: &Mail) -> Result<Self, MailError> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let builder = builder.port(config.port);
        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            },
            _ => builder,
        };

        tracing::info!(host = %config.host, port = config.port, "smtp transport ready");

        Ok(Self {
            inner: builder.build(),
            from: config.from.parse()?,
        })
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(mail.to.parse()?)
            .subject(&mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())?;

        let response = self.inner.send(message).await?;
        if response.is_positive() {
            Ok(())
        } else {
            Err(MailError::Rejected(response.code().to_string()))
        }
    }
}

/// Log mails instead of sending them, used without `mail` configuration.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "mail not sent, no smtp configured");
        Ok(())
    }
}

/// Keep mails in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: std::sync::Mutex<Vec<OutgoingMail>>,
    delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl RecordingTransport {
    /// Take `delay` to deliver each mail.
    pub fn with_delay(delay: std::time::Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Take every mail recorded so far.
    pub fn take(&self) -> Vec<OutgoingMail> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
