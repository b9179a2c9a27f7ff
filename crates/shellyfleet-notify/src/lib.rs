pub mod dispatcher;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod event;
pub mod rate_limiter;
pub mod rule_matcher;

pub use dispatcher::Dispatcher;
pub use driver::NotificationDriver;
pub use drivers::chat::ChatDriver;
pub use drivers::email::EmailDriver;
pub use drivers::webhook::WebhookDriver;
pub use error::NotifyError;
pub use event::DomainEvent;
pub use rate_limiter::RateLimiter;

/// Builds the driver map with all three built-in channel drivers
/// registered.
pub fn default_drivers() -> std::collections::HashMap<shellyfleet_domain::ChannelType, std::sync::Arc<dyn NotificationDriver>> {
    use std::sync::Arc;
    let mut drivers: std::collections::HashMap<shellyfleet_domain::ChannelType, Arc<dyn NotificationDriver>> =
    std::collections::HashMap::new();
    drivers.insert(shellyfleet_domain::ChannelType::Email, Arc::new(EmailDriver::new()));
    drivers.insert(shellyfleet_domain::ChannelType::Webhook, Arc::new(WebhookDriver::new()));
    drivers.insert(shellyfleet_domain::ChannelType::Chat, Arc::new(ChatDriver::new()));
    drivers
}
