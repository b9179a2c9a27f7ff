use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AgentError;

/// Physical Wi-Fi access the Provisioner needs to carry out a task: join the
/// device's temporary AP, then join the target production network once the
/// device has been reconfigured to it. Swappable so the real platform
/// adapter (wpa_supplicant on Linux, NetworkManager, an OS-specific API) can
/// replace the stub without touching the runner.
#[async_trait]
pub trait WifiAdapter: Send + Sync {
    async fn connect(&self, ssid: &str, password: Option<&str>) -> Result<(), AgentError>;
    async fn current_ssid(&self) -> Result<Option<String>, AgentError>;
    async fn disconnect(&self) -> Result<(), AgentError>;
}

/// Simulates Wi-Fi association in memory. Performs no real network I/O —
/// the stand-in used until a platform-specific adapter is wired in.
#[derive(Debug, Default)]
pub struct StubWifiAdapter {
    current: Mutex<Option<String>>,
}

impl StubWifiAdapter {
    pub fn new() -> Self {
        StubWifiAdapter::default()
    }
}

#[async_trait]
impl WifiAdapter for StubWifiAdapter {
    async fn connect(&self, ssid: &str, _password: Option<&str>) -> Result<(), AgentError> {
        debug!(ssid, "stub wifi adapter: associating");
        *self.current.lock().await = Some(ssid.to_string());
        Ok(())
    }

    async fn current_ssid(&self) -> Result<Option<String>, AgentError> {
        Ok(self.current.lock().await.clone())
    }

    async fn disconnect(&self) -> Result<(), AgentError> {
        *self.current.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_then_current_ssid_reflects_join() {
        let adapter = StubWifiAdapter::new();
        assert_eq!(adapter.current_ssid().await.unwrap(), None);
        adapter.connect("shelly-plug-ABCDEF", None).await.unwrap();
        assert_eq!(adapter.current_ssid().await.unwrap(), Some("shelly-plug-ABCDEF".to_string()));
    }

    #[tokio::test]
    async fn disconnect_clears_current_ssid() {
        let adapter = StubWifiAdapter::new();
        adapter.connect("home-network", Some("hunter2")).await.unwrap();
        adapter.disconnect().await.unwrap();
        assert_eq!(adapter.current_ssid().await.unwrap(), None);
    }
}
