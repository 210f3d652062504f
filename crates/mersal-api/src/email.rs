//! Transactional email. Delivery is handed to an SMTP relay; when none is
//! configured the mail is only logged.

use anyhow::{Context, Result};
use askama::Template;
use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as MailMessage, Tokio1Executor};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    /// Sender mailbox, e.g. `Mersal <hello@example.com>`
    pub from: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("from", &self.from)
            .finish()
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("invalid sender address '{}'", config.from))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .with_context(|| format!("invalid SMTP relay '{}'", config.host))?
            .credentials(Credentials::new(config.user, config.password))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let to: Mailbox = email
            .to
            .parse()
            .with_context(|| format!("invalid recipient '{}'", email.to))?;
        let message = MailMessage::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .context("failed to build email")?;

        self.transport
            .send(message)
            .await
            .context("SMTP relay rejected email")?;
        debug!("email sent to {}", email.to);
        Ok(())
    }
}

/// Drops every email after logging it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        info!("email delivery disabled, not sending '{}' to {}", email.subject, email.to);
        Ok(())
    }
}

#[derive(Template)]
#[template(path = "welcome_email.html")]
struct WelcomeEmail<'a> {
    name: &'a str,
    client_url: &'a str,
}

pub fn welcome_email(to: &str, name: &str, client_url: &str) -> Result<OutgoingEmail> {
    let html = WelcomeEmail { name, client_url }
        .render()
        .context("failed to render welcome email")?;

    Ok(OutgoingEmail {
        to: to.to_string(),
        subject: "Welcome to Mersal".to_string(),
        html,
    })
}
