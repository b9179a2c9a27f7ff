use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use shellyfleet_domain::{ChannelType, DeliveryEvent, DeliveryStatus};
use shellyfleet_store::Storage;
use tracing::warn;
use uuid::Uuid;

use crate::driver::NotificationDriver;
use crate::event::DomainEvent;
use crate::rate_limiter::RateLimiter;
use crate::rule_matcher;

/// Coordinates `producer -> rule matcher -> per-rule rate limiter ->
/// channel driver -> delivery log`.
pub struct Dispatcher {
    store: Arc<dyn Storage>,
    drivers: HashMap<ChannelType, Arc<dyn NotificationDriver>>,
    rate_limiter: RateLimiter,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Storage>, drivers: HashMap<ChannelType, Arc<dyn NotificationDriver>>) -> Self {
        Dispatcher { store, drivers, rate_limiter: RateLimiter::new() }
    }

    /// Evaluates every rule against `event`; for each match that clears the
    /// rate limiter, dispatches fire-and-forget with at most one retry on
    /// transport error, always recording the outcome.
    pub async fn dispatch(&self, event: DomainEvent) -> Result<(), shellyfleet_store::StoreError> {
        let rules = self.store.list_notification_rules().await?;
        let now = Utc::now();

        for rule in rules {
            if !rule_matcher::matches(&rule, &event) {
                continue;
            }

            let allowed = self
            .rate_limiter
            .check_and_record(rule.id, rule.min_interval_min, rule.max_per_hour, now)
            .await;

            if !allowed {
                self.store
                .record_delivery_event(DeliveryEvent {
                        id: Uuid::new_v4(),
                        channel_id: rule.channel_id,
                        rule_id: Some(rule.id),
                        status: DeliveryStatus::RateLimited,
                        attempt: 0,
                        error: None,
                        created_at: now,
                })
                .await?;
                continue;
            }

            let Some(channel) = self.store.get_notification_channel(rule.channel_id).await? else {
                warn!(channel_id = %rule.channel_id, "notification rule references missing channel");
                continue;
            };
            if !channel.enabled {
                continue;
            }
            let Some(driver) = self.drivers.get(&channel.channel_type).cloned() else {
                warn!(channel_type = ?channel.channel_type, "no driver registered for channel type");
                continue;
            };

            let store = self.store.clone();
            let event = event.clone();
            let config = channel.config.clone();
            let channel_id = channel.id;
            let rule_id = rule.id;
            tokio::spawn(async move {
                    deliver_with_retry(store, driver, config, event, channel_id, rule_id).await;
            });
        }
        Ok(())
    }
}

/// At most one retry on transport error; permanent failures are recorded
///.
async fn deliver_with_retry(
    store: Arc<dyn Storage>,
    driver: Arc<dyn NotificationDriver>,
    config: serde_json::Value,
    event: DomainEvent,
    channel_id: Uuid,
    rule_id: Uuid,
) {
    for attempt in 1..=2u32 {
        match driver.send(&config, &event).await {
            Ok(()) => {
                let _ = store
                .record_delivery_event(DeliveryEvent {
                        id: Uuid::new_v4(),
                        channel_id,
                        rule_id: Some(rule_id),
                        status: DeliveryStatus::Success,
                        attempt,
                        error: None,
                        created_at: Utc::now(),
                })
                .await;
                return;
            }
            Err(e) if attempt == 1 => {
                warn!(channel_id = %channel_id, error = %e, "notification delivery failed, retrying once");
                continue;
            }
            Err(e) => {
                let _ = store
                .record_delivery_event(DeliveryEvent {
                        id: Uuid::new_v4(),
                        channel_id,
                        rule_id: Some(rule_id),
                        status: DeliveryStatus::Failed,
                        attempt,
                        error: Some(e.to_string()),
                        created_at: Utc::now(),
                })
                .await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shellyfleet_domain::{NotificationChannel, NotificationRule, Severity};
    use shellyfleet_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDriver {
        calls: Arc<AtomicUsize>,
        fail_until: usize,
    }

    #[async_trait]
    impl NotificationDriver for CountingDriver {
        fn channel_type(&self) -> ChannelType {
            ChannelType::Webhook
        }
        async fn send(&self, _config: &serde_json::Value, _event: &DomainEvent) -> Result<(), crate::error::NotifyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_until {
                Err(crate::error::NotifyError::Transport(Uuid::nil(), "boom".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn matched_rule_delivers_and_records_success() {
        let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        let channel = NotificationChannel {
            id: Uuid::new_v4(),
            name: "c".into(),
            channel_type: ChannelType::Webhook,
            config: serde_json::json!({}),
            enabled: true,
            created_at: Utc::now(),
        };
        store.upsert_notification_channel(channel.clone()).await.unwrap();
        let rule = NotificationRule {
            id: Uuid::new_v4(),
            name: "r".into(),
            channel_id: channel.id,
            event_types: vec![],
            min_severity: Severity::Info,
            min_interval_min: 0,
            max_per_hour: 100,
            enabled: true,
        };
        store.upsert_notification_rule(rule).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut drivers: HashMap<ChannelType, Arc<dyn NotificationDriver>> = HashMap::new();
        drivers.insert(ChannelType::Webhook, Arc::new(CountingDriver { calls: calls.clone(), fail_until: 0 }));

        let dispatcher = Dispatcher::new(store.clone(), drivers);
        dispatcher.dispatch(DomainEvent::new("drift_detected", Severity::Warning, "m")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limited_rule_is_recorded_without_delivery() {
        let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        let channel = NotificationChannel {
            id: Uuid::new_v4(),
            name: "c".into(),
            channel_type: ChannelType::Webhook,
            config: serde_json::json!({}),
            enabled: true,
            created_at: Utc::now(),
        };
        store.upsert_notification_channel(channel.clone()).await.unwrap();
        let rule = NotificationRule {
            id: Uuid::new_v4(),
            name: "r".into(),
            channel_id: channel.id,
            event_types: vec![],
            min_severity: Severity::Info,
            min_interval_min: 60,
            max_per_hour: 100,
            enabled: true,
        };
        store.upsert_notification_rule(rule.clone()).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut drivers: HashMap<ChannelType, Arc<dyn NotificationDriver>> = HashMap::new();
        drivers.insert(ChannelType::Webhook, Arc::new(CountingDriver { calls: calls.clone(), fail_until: 0 }));

        let dispatcher = Dispatcher::new(store.clone(), drivers);
        dispatcher.dispatch(DomainEvent::new("drift_detected", Severity::Warning, "m")).await.unwrap();
        dispatcher.dispatch(DomainEvent::new("drift_detected", Severity::Warning, "m")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (events, _) = store
        .list_delivery_events(&shellyfleet_store::DeliveryEventFilter::default(), shellyfleet_domain::PageParams::clamp(Some(1), Some(20)))
        .await
        .unwrap();
        assert!(events.iter().any(|e| e.status == DeliveryStatus::RateLimited));
    }
}
