use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde_json::Value;
use shellyfleet_devicecfg::{detect_drift, from_api_config, normalize, to_api_config};
use shellyfleet_domain::{AuditEvent, AuditKind, DeviceConfiguration, Envelope, Severity};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

async fn load_device(state: &AppState, id: Uuid) -> Result<shellyfleet_domain::Device, ApiError> {
    state.store.get_device(id).await?.ok_or_else(|| ApiError::not_found("device not found"))
}

async fn load_or_default_config(state: &AppState, device: &shellyfleet_domain::Device) -> Result<DeviceConfiguration, ApiError> {
    match state.store.get_device_configuration(device.id).await? {
        Some(cfg) => Ok(cfg),
        None => Ok(from_api_config(&device.settings, device)),
    }
}

/// `GET /api/v1/devices/{id}/config` — the stored desired configuration, in
/// wire form.
pub async fn get_desired_raw(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<Value>>, ApiError> {
    let device = load_device(&state, id).await?;
    let cfg = load_or_default_config(&state, &device).await?;
    Ok(Json(Envelope::ok(to_api_config(&cfg, &device))))
}

/// `GET /api/v1/devices/{id}/config/typed` — the stored desired
/// configuration, in typed form.
pub async fn get_desired_typed(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<DeviceConfiguration>>, ApiError> {
    let device = load_device(&state, id).await?;
    let cfg = load_or_default_config(&state, &device).await?;
    Ok(Json(Envelope::ok(cfg)))
}

pub async fn get_desired_typed_normalized(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<Value>>, ApiError> {
    let device = load_device(&state, id).await?;
    let cfg = load_or_default_config(&state, &device).await?;
    let as_value = serde_json::to_value(&cfg).unwrap_or(Value::Null);
    Ok(Json(Envelope::ok(normalize(&as_value))))
}

/// `GET /api/v1/devices/{id}/config/current` — live settings fetched
/// straight from the device.
pub async fn get_current_raw(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<Value>>, ApiError> {
    let device = load_device(&state, id).await?;
    let client = state.clients.for_generation(device.generation);
    let live = client.get_settings(device.ip).await?;
    Ok(Json(Envelope::ok(live)))
}

pub async fn get_current_normalized(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<Value>>, ApiError> {
    let device = load_device(&state, id).await?;
    let client = state.clients.for_generation(device.generation);
    let live = client.get_settings(device.ip).await?;
    Ok(Json(Envelope::ok(normalize(&live))))
}

/// `PUT /api/v1/devices/{id}/config` — pushes `body` to the device, then
/// persists it as the new desired configuration.
pub async fn put_desired(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<Envelope<DeviceConfiguration>>, ApiError> {
    let device = load_device(&state, id).await?;
    let typed = from_api_config(&body, &device);
    let client = state.clients.for_generation(device.generation);
    client.put_settings(device.ip, &to_api_config(&typed, &device)).await?;
    let saved = state.store.upsert_device_configuration(typed).await?;
    state
    .store
    .append_event(AuditEvent::new(AuditKind::ConfigPushed { device_id: device.id }))
    .await?;
    Ok(Json(Envelope::ok(saved)))
}

/// `POST /api/v1/devices/{id}/config/import` — stores `body` as the desired
/// configuration without pushing it to the device.
pub async fn import_desired(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<Envelope<DeviceConfiguration>>, ApiError> {
    let device = load_device(&state, id).await?;
    let typed = from_api_config(&body, &device);
    let saved = state.store.upsert_device_configuration(typed).await?;
    Ok(Json(Envelope::ok(saved)))
}

/// `POST /api/v1/devices/{id}/config/export` — the stored desired
/// configuration, in wire form, suitable for writing to a file.
pub async fn export_desired(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<Value>>, ApiError> {
    get_desired_raw(State(state), Path(id)).await
}

/// `GET /api/v1/devices/{id}/drift` — compares the stored desired
/// configuration against what the device actually reports, recording an
/// audit event and firing a notification when they diverge.
pub async fn drift(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<Option<Value>>>, ApiError> {
    let device = load_device(&state, id).await?;
    let cfg = load_or_default_config(&state, &device).await?;
    let desired_raw = to_api_config(&cfg, &device);
    let client = state.clients.for_generation(device.generation);
    let ip = device.ip;
    let report = detect_drift(&device, &desired_raw, || async move { client.get_settings(ip).await }).await?;

    let Some(report) = report else {
        return Ok(Json(Envelope::ok(None)));
    };

    state
    .store
    .append_event(AuditEvent::new(AuditKind::DriftDetected { device_id: device.id, severity: report.severity }))
    .await?;

    let severity = report.severity;
    let message = format!("configuration drift detected on device {}", device.name);
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
            let _ = dispatcher.dispatch(shellyfleet_notify::DomainEvent::new("drift_detected", severity, message)).await;
    });

    let body = serde_json::json!({
                "severity": match severity { Severity::Info => "info", Severity::Warning => "warning", Severity::Critical => "critical" },
                "changes": report.change_set.0.len(),
    });
    Ok(Json(Envelope::ok(Some(body))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellyfleet_domain::{DeviceFamily, DeviceGeneration, DeviceStatus, MacAddress};

    fn device() -> shellyfleet_domain::Device {
        let now = Utc::now();
        shellyfleet_domain::Device {
            id: Uuid::new_v4(),
            mac: MacAddress::parse("AA:BB:CC:DD:EE:02").unwrap(),
            ip: "192.168.1.9".parse().unwrap(),
            generation: DeviceGeneration::Gen1,
            family: DeviceFamily::Gen1RelayPM,
            model: "SHSW-PM".into(),
            name: "office".into(),
            firmware: "1.0".into(),
            status: DeviceStatus::Online,
            last_seen: now,
            settings: serde_json::json!({ "wifi_sta": { "ssid": "home" } }),
            rev: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn round_trips_settings_blob_through_typed_form() {
        let device = device();
        let typed = from_api_config(&device.settings, &device);
        let back = to_api_config(&typed, &device);
        assert_eq!(normalize(&back), normalize(&device.settings));
    }
}
