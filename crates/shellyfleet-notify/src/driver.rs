use async_trait::async_trait;
use serde_json::Value;
use shellyfleet_domain::ChannelType;

use crate::error::NotifyError;
use crate::event::DomainEvent;

/// Pluggable channel driver,
/// implemented by [`crate::drivers::email::EmailDriver`],
/// [`crate::drivers::webhook::WebhookDriver`], and
/// [`crate::drivers::chat::ChatDriver`].
#[async_trait]
pub trait NotificationDriver: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    /// Sends `event` through this driver using the channel's opaque
    /// `config` blob. Errors are transport errors only — rule matching and
    /// rate limiting happen upstream in the dispatcher.
    async fn send(&self, config: &Value, event: &DomainEvent) -> Result<(), NotifyError>;
}
