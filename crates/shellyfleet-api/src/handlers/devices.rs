use std::net::Ipv4Addr;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use shellyfleet_domain::{
    Device, DeviceFamily, DeviceGeneration, DeviceStatus, Envelope, MacAddress, Pagination,
};
use shellyfleet_store::DeviceFilter;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::PageQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListDevicesQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub status: Option<DeviceStatus>,
    pub family_model_contains: Option<String>,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListDevicesQuery>) -> Result<Json<Envelope<Vec<Device>>>, ApiError> {
    let filter = DeviceFilter {
        status: query.status,
        family_model_contains: query.family_model_contains,
        include_deleted: false,
    };
    let page = query.page.clamp();
    let (devices, total) = state.store.list_devices(&filter, page).await?;
    Ok(Json(Envelope::ok_with_pagination(devices, Pagination::new(page, total))))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<Device>>, ApiError> {
    let device = state.store.get_device(id).await?.ok_or_else(|| ApiError::not_found("device not found"))?;
    Ok(Json(Envelope::ok(device)))
}

#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub mac: String,
    pub ip: Ipv4Addr,
    pub name: String,
    pub generation: DeviceGeneration,
    pub model: String,
}

/// Manual registration, used when a device is already provisioned and
/// known by IP/MAC rather than discovered.
pub async fn create(State(state): State<AppState>, Json(body): Json<CreateDeviceRequest>) -> Result<Json<Envelope<Device>>, ApiError> {
    let mac = MacAddress::parse(&body.mac).map_err(ApiError::validation)?;
    let family = match body.generation {
        DeviceGeneration::Gen1 => DeviceFamily::Gen1RelaySingle,
        DeviceGeneration::Gen2Plus => DeviceFamily::Gen2,
    };
    let now = Utc::now();
    let device = Device {
        id: Uuid::new_v4(),
        mac,
        ip: body.ip,
        generation: body.generation,
        family,
        model: body.model,
        name: body.name,
        firmware: String::new(),
        status: DeviceStatus::Online,
        last_seen: now,
        settings: serde_json::json!({}),
        rev: 0,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    let device = state.store.upsert_device(device).await?;
    Ok(Json(Envelope::ok(device)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateDeviceRequest>,
) -> Result<Json<Envelope<Device>>, ApiError> {
    let mut device = state.store.get_device(id).await?.ok_or_else(|| ApiError::not_found("device not found"))?;
    if let Some(name) = body.name {
        device.name = name;
    }
    device.updated_at = Utc::now();
    device.rev += 1;
    let device = state.store.upsert_device(device).await?;
    Ok(Json(Envelope::ok(device)))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<()>>, ApiError> {
    state.store.soft_delete_device(id).await?;
    Ok(Json(Envelope::ok(())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellyfleet_store::MemoryStore;
    use std::sync::Arc;

    fn seed_device() -> Device {
        let now = Utc::now();
        Device {
            id: Uuid::new_v4(),
            mac: MacAddress::parse("AA:BB:CC:DD:EE:01").unwrap(),
            ip: "192.168.1.5".parse().unwrap(),
            generation: DeviceGeneration::Gen1,
            family: DeviceFamily::Gen1RelaySingle,
            model: "SHSW-1".into(),
            name: "lamp".into(),
            firmware: "1.0".into(),
            status: DeviceStatus::Online,
            last_seen: now,
            settings: serde_json::json!({}),
            rev: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn get_missing_device_is_not_found() {
        let store: Arc<dyn shellyfleet_store::Storage> = Arc::new(MemoryStore::new());
        let err = get_device_not_found(store).await;
        assert_eq!(err.kind, shellyfleet_domain::ErrorKind::NotFound);
    }

    async fn get_device_not_found(store: Arc<dyn shellyfleet_store::Storage>) -> ApiError {
        store.get_device(Uuid::new_v4()).await.unwrap().ok_or_else(|| ApiError::not_found("device not found")).unwrap_err()
    }

    #[tokio::test]
    async fn update_bumps_rev_and_touches_updated_at() {
        let store = MemoryStore::new();
        let device = seed_device();
        store.upsert_device(device.clone()).await.unwrap();
        let mut updated = device.clone();
        updated.name = "renamed".into();
        updated.rev += 1;
        let saved = store.upsert_device(updated).await.unwrap();
        assert_eq!(saved.rev, 1);
        assert_eq!(saved.name, "renamed");
    }
}
