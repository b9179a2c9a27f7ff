use std::net::Ipv4Addr;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use shellyfleet_domain::{DeviceGeneration, Envelope, MacAddress, ProvisioningAgent, ProvisioningTask};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub hostname: String,
    pub capabilities: Vec<String>,
}

pub async fn register_agent(State(state): State<AppState>, Json(body): Json<RegisterAgentRequest>) -> Result<Json<Envelope<ProvisioningAgent>>, ApiError> {
    let agent = state.orchestrator.register_agent(body.hostname, body.capabilities).await?;
    Ok(Json(Envelope::ok(agent)))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    #[allow(dead_code)]
    pub status: Option<String>,
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Json(_body): Json<HeartbeatRequest>,
) -> Result<Json<Envelope<ProvisioningAgent>>, ApiError> {
    let agent = state.orchestrator.heartbeat(agent_id).await?;
    Ok(Json(Envelope::ok(agent)))
}

#[derive(Debug, Deserialize)]
pub struct NextTaskQuery {
    pub agent_id: Uuid,
}

pub async fn next_task(State(state): State<AppState>, Query(query): Query<NextTaskQuery>) -> Result<Json<Envelope<Option<ProvisioningTask>>>, ApiError> {
    let task = state.orchestrator.assign_next(query.agent_id).await?;
    Ok(Json(Envelope::ok(task)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Start,
    Complete,
    Fail,
}

#[derive(Debug, Deserialize)]
pub struct ReportProgressRequest {
    pub event: ProgressEvent,
    pub error: Option<String>,
}

/// `POST /provisioner/tasks/{task_id}/progress`. `Complete` carries no
/// device identity — that arrives separately via [`report_device`], which
/// is what actually transitions the task to `Completed`; here it is a
/// no-op that just returns the task's current state.
pub async fn report_progress(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(body): Json<ReportProgressRequest>,
) -> Result<Json<Envelope<ProvisioningTask>>, ApiError> {
    let task = match body.event {
        ProgressEvent::Start => state.orchestrator.start(task_id).await?,
        ProgressEvent::Fail => state.orchestrator.fail(task_id, body.error.unwrap_or_default()).await?,
        ProgressEvent::Complete => state.store.get_provisioning_task(task_id).await?.ok_or_else(|| ApiError::not_found("task not found"))?,
    };
    Ok(Json(Envelope::ok(task)))
}

#[derive(Debug, Deserialize)]
pub struct ReportDeviceRequest {
    pub task_id: Uuid,
    pub mac: String,
    pub ip: String,
    #[allow(dead_code)]
    pub name: String,
}

/// `POST /provisioner/report-device` — the agent's "I finished flashing
/// this device" call. Probes the device once to learn its generation and
/// model, then hands off to [`shellyfleet_provisioning::Orchestrator::complete`],
/// which persists the device and marks the task `Completed`.
pub async fn report_device(State(state): State<AppState>, Json(body): Json<ReportDeviceRequest>) -> Result<Json<Envelope<ProvisioningTask>>, ApiError> {
    let mac = MacAddress::parse(&body.mac).map_err(ApiError::validation)?;
    let ip: Ipv4Addr = body.ip.parse().map_err(|_| ApiError::validation("invalid ip address"))?;
    let (generation, model) = resolve_device_identity(ip).await;
    let task = state.orchestrator.complete(body.task_id, mac, ip, generation, model).await?;
    Ok(Json(Envelope::ok(task)))
}

/// Probes `/shelly` to classify the freshly-provisioned device. Falls back
/// to Gen1/unknown if the device isn't reachable yet — the task still
/// completes; an operator can correct the model later via `PUT /devices/{id}`.
async fn resolve_device_identity(ip: Ipv4Addr) -> (DeviceGeneration, String) {
    let client = reqwest::Client::new();
    if let Ok(resp) = client.get(format!("http://{ip}/shelly")).timeout(Duration::from_secs(2)).send().await {
        if let Ok(body) = resp.json::<serde_json::Value>().await {
            let (family, model) = shellyfleet_discovery::classify(&body);
            let generation = match family {
                shellyfleet_domain::DeviceFamily::Gen2 => DeviceGeneration::Gen2Plus,
                _ => DeviceGeneration::Gen1,
            };
            return (generation, model);
        }
    }
    (DeviceGeneration::Gen1, "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellyfleet_provisioning::Orchestrator;
    use shellyfleet_store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn heartbeat_for_unknown_agent_is_not_found_kind() {
        let store: Arc<dyn shellyfleet_store::Storage> = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(store);
        let err = orchestrator.heartbeat(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), shellyfleet_domain::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn next_task_with_no_pending_tasks_returns_none() {
        let store: Arc<dyn shellyfleet_store::Storage> = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(store);
        let agent = orchestrator.register_agent("host-1".into(), vec![]).await.unwrap();
        let task = orchestrator.assign_next(agent.id).await.unwrap();
        assert!(task.is_none());
    }
}
