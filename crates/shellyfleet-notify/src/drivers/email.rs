use async_trait::async_trait;
use lettre::message::Message;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;
use shellyfleet_domain::ChannelType;

use crate::driver::NotificationDriver;
use crate::error::NotifyError;
use crate::event::DomainEvent;

#[derive(Debug, Deserialize)]
struct EmailConfig {
    smtp_server: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    from: String,
    to: String,
}

/// SMTP delivery via `lettre`, the ecosystem-standard async SMTP client
///.
pub struct EmailDriver;

impl EmailDriver {
    pub fn new() -> Self {
        EmailDriver
    }
}

impl Default for EmailDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationDriver for EmailDriver {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(&self, config: &Value, event: &DomainEvent) -> Result<(), NotifyError> {
        let cfg: EmailConfig = serde_json::from_value(config.clone())
        .map_err(|e| NotifyError::InvalidConfig(e.to_string()))?;

        let message = Message::builder()
        .from(cfg.from.parse().map_err(|e: lettre::address::AddressError| NotifyError::InvalidConfig(e.to_string()))?)
        .to(cfg.to.parse().map_err(|e: lettre::address::AddressError| NotifyError::InvalidConfig(e.to_string()))?)
        .subject(format!("[shellyfleet] {}", event.event_type))
        .body(event.message.clone())
        .map_err(|e| NotifyError::InvalidConfig(e.to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_server)
        .map_err(|e| NotifyError::Transport(uuid::Uuid::nil(), e.to_string()))?;
        if let (Some(user), Some(pass)) = (cfg.username, cfg.password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }
        let mailer = builder.build();

        mailer
        .send(message)
        .await
        .map_err(|e| NotifyError::Transport(uuid::Uuid::nil(), e.to_string()))?;
        Ok(())
    }
}
