use chrono::{DateTime, Utc};
use shellyfleet_domain::Severity;

/// A domain occurrence that may be worth notifying someone about —
/// discovery promotions, drift detections, provisioning transitions, sync
/// run completions — fed into the rule matcher.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub event_type: String,
    pub severity: Severity,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        DomainEvent {
            event_type: event_type.into(),
            severity,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}
