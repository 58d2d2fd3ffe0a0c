use crate::render::{render_html, render_text, subject};
use async_trait::async_trait;
use interfaces::{Notifier, RunSummary};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};

/// Port on which the server expects TLS from the first byte instead of STARTTLS
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    /// Also used as the sender address
    pub username: String,
    pub password: String,
    pub recipient: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid e-mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Sends a run summary by e-mail over authenticated SMTP
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn recipient(&self) -> &str {
        &self.config.recipient
    }

    pub fn build_message(&self, summary: &RunSummary) -> Result<Message, NotifyError> {
        let from: Mailbox = self.config.username.parse()?;
        let to: Mailbox = self.config.recipient.parse()?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject(summary))
            .multipart(MultiPart::alternative_plain_html(render_text(summary), render_html(summary)))?;

        Ok(message)
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let builder = if self.config.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_server)?
        };

        Ok(builder
            .port(self.config.smtp_port)
            .credentials(Credentials::new(self.config.username.clone(), self.config.password.clone()))
            .build())
    }

    pub async fn send(&self, summary: &RunSummary) -> Result<bool, NotifyError> {
        if !summary.is_reportable() {
            info!("Nothing published and nothing failed, no notification sent");
            return Ok(false);
        }

        let message = self.build_message(summary)?;
        info!("Sending notification email to {}", self.config.recipient);

        self.transport()?.send(message).await.map_err(|e| {
            error!("Failed to send notification email: {}", e);
            NotifyError::Smtp(e)
        })?;

        info!("Notification email sent successfully to {}", self.config.recipient);
        Ok(true)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, summary: &RunSummary) -> anyhow::Result<()> {
        self.send(summary).await?;
        Ok(())
    }
}
