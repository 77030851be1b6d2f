use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

/// A composed operator notification, independent of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub from: String,
    pub to: Vec<String>,
    pub reply_to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// SMTP transport authenticated with the site mailbox credentials.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the transport, or `None` unless both mailbox credentials and at
    /// least one recipient are set.
    ///
    /// Port 465 uses implicit TLS; any other port upgrades with STARTTLS.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        if !config.is_email_configured() {
            return Ok(None);
        }
        let Some((user, pass)) = config.email_credentials() else {
            return Ok(None);
        };

        let builder = if config.email_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.email_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.email_host)
        }
        .context(format!("Invalid SMTP host: {}", config.email_host))?;

        let transport = builder
            .port(config.email_port)
            .credentials(Credentials::new(user.to_string(), pass.to_string()))
            .build();

        info!(
            "SMTP transport ready ({}:{})",
            config.email_host, config.email_port
        );

        Ok(Some(Self { transport }))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let message = build_message(notification)?;

        self.transport
            .send(message)
            .await
            .context("SMTP server rejected the message")?;

        Ok(())
    }
}

fn build_message(notification: &Notification) -> Result<Message> {
    let from: Mailbox = notification
        .from
        .parse()
        .context(format!("Invalid sender address: {}", notification.from))?;

    let mut builder = Message::builder()
        .from(from)
        .subject(notification.subject.as_str());

    // The submitter's address is still in the body when it is not a valid mailbox
    match notification.reply_to.parse::<Mailbox>() {
        Ok(reply_to) => builder = builder.reply_to(reply_to),
        Err(e) => warn!(
            "Omitting Reply-To, address {:?} is not a valid mailbox: {}",
            notification.reply_to, e
        ),
    }

    for recipient in &notification.to {
        let mailbox: Mailbox = recipient
            .parse()
            .context(format!("Invalid recipient address: {}", recipient))?;
        builder = builder.to(mailbox);
    }

    builder
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(notification.text.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(notification.html.clone()),
                ),
        )
        .context("Failed to build email message")
}
