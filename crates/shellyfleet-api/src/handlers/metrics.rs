use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use shellyfleet_domain::{AuditKind, DeviceStatus, Envelope};
use shellyfleet_store::DeviceFilter;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let (devices, total) = state.store.list_devices(&DeviceFilter::default(), shellyfleet_domain::PageParams::clamp(Some(1), Some(100))).await?;
    let online = devices.iter().filter(|d| d.status == DeviceStatus::Online).count();
    Ok(Json(Envelope::ok(json!({ "status": "ok", "devices_total": total, "devices_online": online }))))
}

pub async fn system(State(state): State<AppState>) -> Json<Envelope<std::collections::HashMap<String, Vec<shellyfleet_metrics::Point>>>> {
    Json(Envelope::ok(state.metrics.full_snapshot().await))
}

pub async fn devices(State(state): State<AppState>) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let (devices, total) = state.store.list_devices(&DeviceFilter::default(), shellyfleet_domain::PageParams::clamp(Some(1), Some(100))).await?;
    let online = devices.iter().filter(|d| d.status == DeviceStatus::Online).count();
    let offline = devices.iter().filter(|d| d.status == DeviceStatus::Offline).count();
    let unreachable = devices.iter().filter(|d| d.status == DeviceStatus::Unreachable).count();
    let provisioning = devices.iter().filter(|d| d.status == DeviceStatus::Provisioning).count();
    Ok(Json(Envelope::ok(json!({
                    "total": total,
                    "online": online,
                    "offline": offline,
                    "unreachable": unreachable,
                    "provisioning": provisioning,
    }))))
}

/// Counts recent drift detections from the audit trail, the cheapest
/// source of truth since drift itself is computed on demand rather than
/// continuously tracked.
pub async fn drift(State(state): State<AppState>) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let events = state.store.list_events(500).await?;
    let mut warning = 0u64;
    let mut info = 0u64;
    for event in &events {
        if let AuditKind::DriftDetected { severity, .. } = &event.kind {
            match severity {
                shellyfleet_domain::Severity::Warning | shellyfleet_domain::Severity::Critical => warning += 1,
                shellyfleet_domain::Severity::Info => info += 1,
            }
        }
    }
    Ok(Json(Envelope::ok(json!({ "warning": warning, "info": info }))))
}

pub async fn notifications(State(state): State<AppState>) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let (events, total) = state
    .store
    .list_delivery_events(&shellyfleet_store::DeliveryEventFilter::default(), shellyfleet_domain::PageParams::clamp(Some(1), Some(100)))
    .await?;
    let success = events.iter().filter(|e| e.status == shellyfleet_domain::DeliveryStatus::Success).count();
    let failed = events.iter().filter(|e| e.status == shellyfleet_domain::DeliveryStatus::Failed).count();
    let rate_limited = events.iter().filter(|e| e.status == shellyfleet_domain::DeliveryStatus::RateLimited).count();
    Ok(Json(Envelope::ok(json!({ "total": total, "success": success, "failed": failed, "rate_limited": rate_limited }))))
}

/// `GET /metrics/ws` — streams live metric points to an admin-authenticated
/// WebSocket client. Rejects the upgrade outright (rather than accepting
/// and immediately closing) on an unrecognized `Origin` or a per-IP cap
/// breach, since both are cheaper to reject before the handshake completes.
pub async fn ws_metrics(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let origin = headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.ws_hub.origin_allowed(origin) {
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }
    let Some(guard) = state.ws_connections.try_acquire(peer.ip(), state.ws_hub.per_ip_cap).await else {
        return (StatusCode::TOO_MANY_REQUESTS, "per-ip connection cap reached").into_response();
    };
    let metrics = state.metrics.clone();
    let hub = state.ws_hub.clone();
    upgrade.on_upgrade(move |socket| async move {
            run_ws_session(socket, metrics, hub, guard).await;
    })
}

async fn run_ws_session(
    mut socket: WebSocket,
    metrics: std::sync::Arc<shellyfleet_metrics::MetricsBus>,
    hub: std::sync::Arc<shellyfleet_metrics::WsHubConfig>,
    _guard: shellyfleet_metrics::ConnectionGuard,
) {
    let mut updates = metrics.subscribe();
    let mut heartbeat = tokio::time::interval(hub.heartbeat);
    let mut idle_deadline = Box::pin(tokio::time::sleep(hub.idle_timeout));

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Ok((series, point)) = update else { break };
                let payload = json!({ "series": series, "at": point.at, "value": point.value });
                if socket.send(Message::Text(payload.to_string())).await.is_err() {
                    break;
                }
                idle_deadline.as_mut().reset(tokio::time::Instant::now() + hub.idle_timeout);
            }
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => {
                        idle_deadline.as_mut().reset(tokio::time::Instant::now() + hub.idle_timeout);
                    }
                    _ => break,
                }
            }
            _ = &mut idle_deadline => {
                debug!("metrics websocket idle timeout");
                break;
            }
        }
    }
}
