use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

/// Admin-only WebSocket hub parameters.
#[derive(Debug, Clone)]
pub struct WsHubConfig {
    pub origin_allowlist: Vec<String>,
    pub per_ip_cap: usize,
    pub heartbeat: Duration,
    pub idle_timeout: Duration,
}

impl Default for WsHubConfig {
    fn default() -> Self {
        WsHubConfig {
            origin_allowlist: Vec::new(),
            per_ip_cap: 4,
            heartbeat: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl WsHubConfig {
    /// Empty allow-list means "no restriction" — only non-empty lists are enforced.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.origin_allowlist.is_empty() {
            return true;
        }
        match origin {
            Some(o) => self.origin_allowlist.iter().any(|allowed| allowed == o),
            None => false,
        }
    }
}

/// Per-client-IP connection counter.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    counts: RwLock<HashMap<IpAddr, usize>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        ConnectionTracker::default()
    }

    /// Attempts to reserve a slot for `ip`. Returns `None` if the cap is
    /// already reached; otherwise returns a guard that releases the slot on
    /// drop.
    pub async fn try_acquire(self: &Arc<Self>, ip: IpAddr, cap: usize) -> Option<ConnectionGuard> {
        let mut guard = self.counts.write().await;
        let entry = guard.entry(ip).or_insert(0);
        if *entry >= cap {
            return None;
        }
        *entry += 1;
        Some(ConnectionGuard { tracker: self.clone(), ip })
    }

    async fn release(&self, ip: IpAddr) {
        let mut guard = self.counts.write().await;
        if let Some(count) = guard.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                guard.remove(&ip);
            }
        }
    }
}

/// RAII handle for a reserved WebSocket connection slot. Releases the slot
/// when the connection closes, whatever the reason.
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    ip: IpAddr,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let tracker = self.tracker.clone();
        let ip = self.ip;
        tokio::spawn(async move {
                tracker.release(ip).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cap_rejects_fifth_connection() {
        let tracker = Arc::new(ConnectionTracker::new());
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let mut guards = Vec::new();
        for _ in 0..4 {
            guards.push(tracker.try_acquire(ip, 4).await.unwrap());
        }
        assert!(tracker.try_acquire(ip, 4).await.is_none());
    }

    #[tokio::test]
    async fn origin_allowlist_empty_allows_any() {
        let cfg = WsHubConfig::default();
        assert!(cfg.origin_allowed(Some("https://evil.example")));
        assert!(cfg.origin_allowed(None));
    }

    #[tokio::test]
    async fn origin_allowlist_rejects_unknown_origin() {
        let cfg = WsHubConfig { origin_allowlist: vec!["https://fleet.example".into()],..Default::default() };
        assert!(cfg.origin_allowed(Some("https://fleet.example")));
        assert!(!cfg.origin_allowed(Some("https://evil.example")));
        assert!(!cfg.origin_allowed(None));
    }
}
