use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use shellyfleet_domain::{
    ChannelType, DeliveryEvent, Envelope, NotificationChannel, NotificationRule, Pagination, Severity,
};
use shellyfleet_notify::DomainEvent;
use shellyfleet_store::DeliveryEventFilter;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::PageQuery;
use crate::state::AppState;

pub async fn list_channels(State(state): State<AppState>) -> Result<Json<Envelope<Vec<NotificationChannel>>>, ApiError> {
    let channels = state.store.list_notification_channels().await?;
    Ok(Json(Envelope::ok(channels)))
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    pub channel_type: ChannelType,
    pub config: Value,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create_channel(State(state): State<AppState>, Json(body): Json<CreateChannelRequest>) -> Result<Json<Envelope<NotificationChannel>>, ApiError> {
    let channel = NotificationChannel {
        id: Uuid::new_v4(),
        name: body.name,
        channel_type: body.channel_type,
        config: body.config,
        enabled: body.enabled,
        created_at: Utc::now(),
    };
    let channel = state.store.upsert_notification_channel(channel).await?;
    Ok(Json(Envelope::ok(channel)))
}

pub async fn list_rules(State(state): State<AppState>) -> Result<Json<Envelope<Vec<NotificationRule>>>, ApiError> {
    let rules = state.store.list_notification_rules().await?;
    Ok(Json(Envelope::ok(rules)))
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub channel_id: Uuid,
    #[serde(default)]
    pub event_types: Vec<String>,
    pub min_severity: Severity,
    #[serde(default)]
    pub min_interval_min: u32,
    #[serde(default = "default_max_per_hour")]
    pub max_per_hour: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_max_per_hour() -> u32 {
    60
}

pub async fn create_rule(State(state): State<AppState>, Json(body): Json<CreateRuleRequest>) -> Result<Json<Envelope<NotificationRule>>, ApiError> {
    let rule = NotificationRule {
        id: Uuid::new_v4(),
        name: body.name,
        channel_id: body.channel_id,
        event_types: body.event_types,
        min_severity: body.min_severity,
        min_interval_min: body.min_interval_min,
        max_per_hour: body.max_per_hour,
        enabled: body.enabled,
    };
    let rule = state.store.upsert_notification_rule(rule).await?;
    Ok(Json(Envelope::ok(rule)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub channel_id: Option<Uuid>,
}

pub async fn history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Result<Json<Envelope<Vec<DeliveryEvent>>>, ApiError> {
    let filter = DeliveryEventFilter { channel_id: query.channel_id, status: None };
    let page = query.page.clamp();
    let (events, total) = state.store.list_delivery_events(&filter, page).await?;
    Ok(Json(Envelope::ok_with_pagination(events, Pagination::new(page, total))))
}

#[derive(Debug, Deserialize)]
pub struct TestNotificationRequest {
    pub event_type: String,
    pub severity: Severity,
    pub message: String,
}

/// `POST /api/v1/notifications/test` — runs a synthetic event through the
/// real dispatcher so an operator can confirm a channel/rule pairing
/// actually delivers before relying on it.
pub async fn test_notification(State(state): State<AppState>, Json(body): Json<TestNotificationRequest>) -> Result<Json<Envelope<()>>, ApiError> {
    let event = DomainEvent::new(body.event_type, body.severity, body.message);
    state.dispatcher.dispatch(event).await?;
    Ok(Json(Envelope::ok(())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellyfleet_store::MemoryStore;

    #[tokio::test]
    async fn create_then_list_channel_round_trips() {
        let store = MemoryStore::new();
        let channel = NotificationChannel {
            id: Uuid::new_v4(),
            name: "ops-email".into(),
            channel_type: ChannelType::Email,
            config: serde_json::json!({}),
            enabled: true,
            created_at: Utc::now(),
        };
        store.upsert_notification_channel(channel.clone()).await.unwrap();
        let channels = store.list_notification_channels().await.unwrap();
        assert!(channels.iter().any(|c| c.id == channel.id));
    }
}
