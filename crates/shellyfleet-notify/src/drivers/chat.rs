use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use shellyfleet_domain::ChannelType;

use crate::driver::NotificationDriver;
use crate::error::NotifyError;
use crate::event::DomainEvent;

#[derive(Debug, Deserialize)]
struct ChatConfig {
    webhook_url: String,
}

/// Chat-style webhook (Slack/Teams-shaped payload), kept as a distinct
/// channel type from [`crate::drivers::webhook::WebhookDriver`] because its
/// message formatting differs.
pub struct ChatDriver {
    client: reqwest::Client,
}

impl ChatDriver {
    pub fn new() -> Self {
        ChatDriver {
            client: reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("reqwest client builds with default TLS backend"),
        }
    }
}

impl Default for ChatDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationDriver for ChatDriver {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Chat
    }

    async fn send(&self, config: &Value, event: &DomainEvent) -> Result<(), NotifyError> {
        let cfg: ChatConfig = serde_json::from_value(config.clone())
        .map_err(|e| NotifyError::InvalidConfig(e.to_string()))?;

        let body = json!({
                "text": format!("*[{:?}]* {}: {}", event.severity, event.event_type, event.message),
        });

        let response = self
        .client
        .post(&cfg.webhook_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| NotifyError::Transport(uuid::Uuid::nil(), e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Transport(uuid::Uuid::nil(), format!("chat webhook returned {}", response.status())));
        }
        Ok(())
    }
}
