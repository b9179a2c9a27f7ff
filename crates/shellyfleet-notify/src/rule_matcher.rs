use shellyfleet_domain::NotificationRule;

use crate::event::DomainEvent;

/// Evaluates `(event.type, event.severity)` against `(rule.event_types,
/// rule.min_severity)`. An empty `event_types` list matches every
/// event type — "all events at or above this severity".
pub fn matches(rule: &NotificationRule, event: &DomainEvent) -> bool {
    rule.enabled
    && event.severity >= rule.min_severity
    && (rule.event_types.is_empty() || rule.event_types.iter().any(|t| t == &event.event_type))
}
