use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use shellyfleet_domain::ChannelType;

use crate::driver::NotificationDriver;
use crate::error::NotifyError;
use crate::event::DomainEvent;

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default)]
    headers: std::collections::HashMap<String, String>,
}

/// Generic HTTP POST webhook, via `reqwest`.
pub struct WebhookDriver {
    client: reqwest::Client,
}

impl WebhookDriver {
    pub fn new() -> Self {
        WebhookDriver {
            client: reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("reqwest client builds with default TLS backend"),
        }
    }
}

impl Default for WebhookDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationDriver for WebhookDriver {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn send(&self, config: &Value, event: &DomainEvent) -> Result<(), NotifyError> {
        let cfg: WebhookConfig = serde_json::from_value(config.clone())
        .map_err(|e| NotifyError::InvalidConfig(e.to_string()))?;

        let body = json!({
                "event_type": event.event_type,
                "severity": event.severity,
                "message": event.message,
                "occurred_at": event.occurred_at,
        });

        let mut request = self.client.post(&cfg.url).json(&body);
        for (key, value) in &cfg.headers {
            request = request.header(key, value);
        }

        let response = request
        .send()
        .await
        .map_err(|e| NotifyError::Transport(uuid::Uuid::nil(), e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Transport(uuid::Uuid::nil(), format!("webhook returned {}", response.status())));
        }
        Ok(())
    }
}
