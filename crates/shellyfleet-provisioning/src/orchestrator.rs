use std::sync::Arc;

use chrono::{Duration, Utc};
use shellyfleet_domain::{
    AgentStatus, AuditEvent, AuditKind, Device, DeviceFamily, DeviceGeneration, DeviceStatus,
    MacAddress, ProvisioningAgent, ProvisioningTask, TaskState,
};
use shellyfleet_store::Storage;
use std::net::Ipv4Addr;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ProvisioningError;
use crate::state_machine::{apply, TaskEvent};

/// Agents whose last heartbeat is older than this are considered offline
/// and their in-flight tasks returned to `pending`.
pub const AGENT_HEARTBEAT_TIMEOUT_SECS: i64 = 90;

/// Coordinates the Manager side of the two-party provisioning protocol:
/// per-item try/continue-on-error, with an audit event appended around
/// every transition.
pub struct Orchestrator {
    store: Arc<dyn Storage>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Orchestrator { store }
    }

    pub async fn register_agent(&self, hostname: String, capabilities: Vec<String>) -> Result<ProvisioningAgent, ProvisioningError> {
        let agent = ProvisioningAgent {
            id: Uuid::new_v4(),
            hostname,
            status: AgentStatus::Online,
            capabilities,
            last_heartbeat: Utc::now(),
        };
        Ok(self.store.upsert_provisioning_agent(agent).await?)
    }

    pub async fn heartbeat(&self, agent_id: Uuid) -> Result<ProvisioningAgent, ProvisioningError> {
        let mut agent = self
        .store
        .get_provisioning_agent(agent_id)
        .await?
        .ok_or(ProvisioningError::AgentNotFound(agent_id))?;
        agent.last_heartbeat = Utc::now();
        if agent.status == AgentStatus::Offline {
            agent.status = AgentStatus::Online;
        }
        Ok(self.store.upsert_provisioning_agent(agent).await?)
    }

    /// Assigns the oldest pending task to `agent_id`.
    /// Range filtering is left to the caller via `in_range`, since agent
    /// range semantics are a provisioner-side concern not modeled here.
    pub async fn assign_next(&self, agent_id: Uuid) -> Result<Option<ProvisioningTask>, ProvisioningError> {
        let agent = self
        .store
        .get_provisioning_agent(agent_id)
        .await?
        .ok_or(ProvisioningError::AgentNotFound(agent_id))?;
        if agent.status == AgentStatus::Offline {
            return Ok(None);
        }
        let mut tasks = self.store.list_provisioning_tasks().await?;
        tasks.retain(|t| t.state == TaskState::Pending);
        tasks.sort_by_key(|t| t.created_at);
        let Some(task) = tasks.into_iter().next() else {
            return Ok(None);
        };
        let from = task.state;
        let task = apply(task, TaskEvent::Assign { agent_id })?;
        let task = self.store.upsert_provisioning_task(task).await?;
        self.store
        .append_event(AuditEvent::new(AuditKind::ProvisioningTransition { task_id: task.id, from, to: task.state }))
        .await?;
        Ok(Some(task))
    }

    pub async fn start(&self, task_id: Uuid) -> Result<ProvisioningTask, ProvisioningError> {
        self.transition(task_id, TaskEvent::Start).await
    }

    /// On success, persists the reported device.
    pub async fn complete(&self, task_id: Uuid, mac: MacAddress, ip: Ipv4Addr, generation: DeviceGeneration, model: String) -> Result<ProvisioningTask, ProvisioningError> {
        let task = self.store.get_provisioning_task(task_id).await?.ok_or(ProvisioningError::TaskNotFound(task_id))?;
        let now = Utc::now();
        let family = match generation {
            DeviceGeneration::Gen1 => DeviceFamily::Gen1RelaySingle,
            DeviceGeneration::Gen2Plus => DeviceFamily::Gen2,
        };
        let device = Device {
            id: Uuid::new_v4(),
            mac,
            ip,
            generation,
            family,
            model,
            name: task.desired_name.clone(),
            firmware: String::new(),
            status: DeviceStatus::Online,
            last_seen: now,
            settings: serde_json::json!({}),
            rev: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.store.bulk_upsert_devices_by_mac(vec![device]).await?;
        self.transition(task_id, TaskEvent::Complete).await
    }

    pub async fn fail(&self, task_id: Uuid, error: String) -> Result<ProvisioningTask, ProvisioningError> {
        let task = self.transition(task_id, TaskEvent::Fail { error }).await?;
        if task.attempts < crate::state_machine::DEFAULT_MAX_ATTEMPTS {
            self.transition(task_id, TaskEvent::Retry).await
        } else {
            Ok(task)
        }
    }

    pub async fn cancel(&self, task_id: Uuid) -> Result<ProvisioningTask, ProvisioningError> {
        self.transition(task_id, TaskEvent::Cancel).await
    }

    async fn transition(&self, task_id: Uuid, event: TaskEvent) -> Result<ProvisioningTask, ProvisioningError> {
        let task = self.store.get_provisioning_task(task_id).await?.ok_or(ProvisioningError::TaskNotFound(task_id))?;
        let from = task.state;
        let task = apply(task, event)?;
        let task = self.store.upsert_provisioning_task(task).await?;
        self.store
        .append_event(AuditEvent::new(AuditKind::ProvisioningTransition { task_id, from, to: task.state }))
        .await?;
        Ok(task)
    }

    /// Returns tasks whose agent's heartbeat has lapsed to `pending`, and
    /// marks the agent `offline`.
    /// Continues past per-agent errors rather than aborting the sweep.
    pub async fn sweep_lapsed_agents(&self) -> Result<u64, ProvisioningError> {
        let now = Utc::now();
        let cutoff = now - Duration::seconds(AGENT_HEARTBEAT_TIMEOUT_SECS);
        let mut recovered = 0u64;
        let agents = self.store.list_provisioning_agents().await?;
        for mut agent in agents {
            if agent.status == AgentStatus::Offline || agent.last_heartbeat > cutoff {
                continue;
            }
            agent.status = AgentStatus::Offline;
            if let Err(e) = self.store.upsert_provisioning_agent(agent.clone()).await {
                warn!(agent_id = %agent.id, error = %e, "failed to mark agent offline");
                continue;
            }
            let tasks = self.store.list_provisioning_tasks().await?;
            for task in tasks {
                if task.assigned_agent == Some(agent.id) && matches!(task.state, TaskState::Assigned | TaskState::Running) {
                    let from = task.state;
                    let mut reverted = task;
                    reverted.state = TaskState::Pending;
                    reverted.assigned_agent = None;
                    reverted.updated_at = now;
                    if let Err(e) = self.store.upsert_provisioning_task(reverted.clone()).await {
                        warn!(task_id = %reverted.id, error = %e, "failed to revert lapsed task");
                        continue;
                    }
                    self.store
                    .append_event(AuditEvent::new(AuditKind::ProvisioningTransition { task_id: reverted.id, from, to: TaskState::Pending }))
                    .await?;
                    recovered += 1;
                }
            }
            info!(agent_id = %agent.id, hostname = %agent.hostname, "agent marked offline after heartbeat lapse");
        }
        Ok(recovered)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkStatus {
    Pending,
    Completed,
    Failed,
}

/// Aggregate status for a `correlation_id` group, computed on demand
/// rather than stored redundantly.
pub fn bulk_status(tasks: &[ProvisioningTask]) -> BulkStatus {
    if tasks.iter().any(|t| t.state == TaskState::Failed && t.attempts >= crate::state_machine::DEFAULT_MAX_ATTEMPTS) {
        return BulkStatus::Failed;
    }
    let all_terminal = tasks.iter().all(|t| matches!(t.state, TaskState::Completed | TaskState::Failed | TaskState::Cancelled));
    if all_terminal {
        BulkStatus::Completed
    } else {
        BulkStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellyfleet_store::MemoryStore;

    fn mk_task(ssid: &str) -> ProvisioningTask {
        let now = Utc::now();
        ProvisioningTask {
            id: Uuid::new_v4(),
            target_ap_ssid: ssid.into(),
            desired_ssid: "home".into(),
            desired_name: "n".into(),
            assigned_agent: None,
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
            correlation_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn assign_next_picks_oldest_pending() {
        let store = Arc::new(MemoryStore::new());
        let orch = Orchestrator::new(store.clone());
        let agent = orch.register_agent("host1".into(), vec![]).await.unwrap();
        store.upsert_provisioning_task(mk_task("ap-a")).await.unwrap();
        let assigned = orch.assign_next(agent.id).await.unwrap().unwrap();
        assert_eq!(assigned.target_ap_ssid, "ap-a");
        assert_eq!(assigned.assigned_agent, Some(agent.id));
    }

    #[tokio::test]
    async fn sweep_returns_lapsed_tasks_to_pending() {
        let store = Arc::new(MemoryStore::new());
        let orch = Orchestrator::new(store.clone());
        let mut agent = orch.register_agent("host1".into(), vec![]).await.unwrap();
        agent.last_heartbeat = Utc::now() - Duration::seconds(AGENT_HEARTBEAT_TIMEOUT_SECS + 10);
        store.upsert_provisioning_agent(agent.clone()).await.unwrap();

        let task = store.upsert_provisioning_task(mk_task("ap-b")).await.unwrap();
        let task = apply(task, TaskEvent::Assign { agent_id: agent.id }).unwrap();
        store.upsert_provisioning_task(task).await.unwrap();

        let recovered = orch.sweep_lapsed_agents().await.unwrap();
        assert_eq!(recovered, 1);
        let task = store.list_provisioning_tasks().await.unwrap().remove(0);
        assert_eq!(task.state, TaskState::Pending);
        assert!(task.assigned_agent.is_none());
    }

    #[test]
    fn bulk_status_completed_requires_all_terminal() {
        let mut a = mk_task("a");
        a.state = TaskState::Completed;
        let mut b = mk_task("b");
        b.state = TaskState::Running;
        assert_eq!(bulk_status(&[a.clone()]), BulkStatus::Completed);
        assert_eq!(bulk_status(&[a, b]), BulkStatus::Pending);
    }
}
