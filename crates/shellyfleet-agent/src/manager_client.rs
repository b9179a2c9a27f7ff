use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shellyfleet_domain::{AgentStatus, ProvisioningAgent, ProvisioningTask};
use uuid::Uuid;

use crate::error::AgentError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Mirrors the wire shape of `shellyfleet_domain::Envelope<T>` for the
/// client side — the server type only derives `Serialize`, so deserializing
/// a response needs its own, deliberately permissive, counterpart.
#[derive(Debug, Deserialize)]
struct WireEnvelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    hostname: &'a str,
    capabilities: &'a [String],
}

#[derive(Debug, Serialize)]
struct ReportDeviceRequest {
    task_id: Uuid,
    mac: String,
    ip: String,
    name: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Start,
    Complete,
    Fail,
}

#[derive(Debug, Serialize)]
struct ReportProgressRequest {
    event: ProgressEvent,
    error: Option<String>,
}

/// Thin HTTP client the Provisioner uses to talk to the Manager's
/// provisioner endpoints.
#[derive(Clone)]
pub struct ManagerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ManagerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        ManagerClient {
            http: reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build().expect("reqwest client"),
            base_url: base_url.into(),
        }
    }

    async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<Option<T>, AgentError> {
        let status = response.status();
        let envelope: WireEnvelope<T> = response
        .json()
        .await
        .map_err(|e| AgentError::ProtocolError(e.to_string()))?;
        if !status.is_success() || !envelope.success {
            let message = envelope
            .error
            .map(|e| format!("{}: {}", e.code, e.message))
            .unwrap_or_else(|| format!("manager returned status {status}"));
            return Err(AgentError::ManagerRejected(message));
        }
        Ok(envelope.data)
    }

    pub async fn register(&self, hostname: &str, capabilities: &[String]) -> Result<ProvisioningAgent, AgentError> {
        let url = format!("{}/provisioner/agents", self.base_url);
        let response = self
        .http
        .post(&url)
        .json(&RegisterRequest { hostname, capabilities })
        .send()
        .await
        .map_err(|e| AgentError::ManagerUnreachable(url, e.to_string()))?;
        Self::unwrap_envelope::<ProvisioningAgent>(response)
        .await?
        .ok_or_else(|| AgentError::ProtocolError("registration returned no agent record".into()))
    }

    pub async fn heartbeat(&self, agent_id: Uuid, status: AgentStatus) -> Result<(), AgentError> {
        let url = format!("{}/provisioner/agents/{agent_id}/heartbeat", self.base_url);
        let response = self
        .http
        .post(&url)
        .json(&serde_json::json!({ "status": status }))
        .send()
        .await
        .map_err(|e| AgentError::ManagerUnreachable(url, e.to_string()))?;
        Self::unwrap_envelope::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn next_task(&self, agent_id: Uuid) -> Result<Option<ProvisioningTask>, AgentError> {
        let url = format!("{}/provisioner/tasks/next?agent_id={agent_id}", self.base_url);
        let response = self
        .http
        .get(&url)
        .send()
        .await
        .map_err(|e| AgentError::ManagerUnreachable(url, e.to_string()))?;
        Self::unwrap_envelope::<ProvisioningTask>(response).await
    }

    pub async fn report_progress(
        &self,
        task_id: Uuid,
        event: ProgressEvent,
        error: Option<String>,
    ) -> Result<ProvisioningTask, AgentError> {
        let url = format!("{}/provisioner/tasks/{task_id}/progress", self.base_url);
        let response = self
        .http
        .post(&url)
        .json(&ReportProgressRequest { event, error })
        .send()
        .await
        .map_err(|e| AgentError::ManagerUnreachable(url, e.to_string()))?;
        Self::unwrap_envelope::<ProvisioningTask>(response)
        .await?
        .ok_or_else(|| AgentError::ProtocolError("progress report returned no task record".into()))
    }

    pub async fn report_device(&self, task_id: Uuid, mac: String, ip: String, name: String) -> Result<(), AgentError> {
        let url = format!("{}/provisioner/report-device", self.base_url);
        let response = self
        .http
        .post(&url)
        .json(&ReportDeviceRequest { task_id, mac, ip, name })
        .send()
        .await
        .map_err(|e| AgentError::ManagerUnreachable(url, e.to_string()))?;
        Self::unwrap_envelope::<serde_json::Value>(response).await?;
        Ok(())
    }
}
