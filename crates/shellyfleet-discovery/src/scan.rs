use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ipnetwork::Ipv4Network;
use shellyfleet_domain::{DiscoveredDevice, DiscoverySource, MacAddress};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::classify::{classify, extract_mac};

const DEFAULT_CONCURRENCY: usize = 10;
const DEFAULT_PER_HOST_TIMEOUT: Duration = Duration::from_secs(2);
const DISCOVERY_TTL_HOURS: i64 = 24;

/// Probes a single host at `/shelly` (Gen2+) then `/settings` (Gen1),
/// returning a classified hit. Used by both the CIDR scanner and the
/// mDNS/SSDP listeners, which hand off a candidate IP here to confirm and
/// classify it.
pub async fn probe_host(client: &reqwest::Client, ip: Ipv4Addr, source: DiscoverySource) -> Option<DiscoveredDevice> {
    probe_host_at(client, ip, 80, source).await
}

async fn probe_host_at(client: &reqwest::Client, ip: Ipv4Addr, port: u16, source: DiscoverySource) -> Option<DiscoveredDevice> {
    for path in ["/shelly", "/settings"] {
        let url = format!("http://{ip}:{port}{path}");
        let resp = match client.get(&url).timeout(DEFAULT_PER_HOST_TIMEOUT).send().await {
            Ok(r) if r.status().is_success() => r,
            _ => continue,
        };
        let Ok(body) = resp.json::<serde_json::Value>().await else { continue };
        let Some(mac_raw) = extract_mac(&body) else { continue };
        let Ok(mac) = MacAddress::parse(&mac_raw) else { continue };
        let (_family, _model) = classify(&body);
        let now = Utc::now();
        return Some(DiscoveredDevice {
                mac,
                ip,
                ap_ssid: None,
                source,
                first_seen: now,
                expires_at: now + chrono::Duration::hours(DISCOVERY_TTL_HOURS),
        });
    }
    None
}

/// Fans out HTTP probes across every host in `cidrs`, bounded by a
/// semaphore (default 10 concurrent), grounded on the credential
/// distributor's semaphore-gated `tokio::spawn` fan-out.
pub async fn scan(cidrs: &[Ipv4Network]) -> Vec<DiscoveredDevice> {
    let client = Arc::new(reqwest::Client::new());
    let semaphore = Arc::new(Semaphore::new(DEFAULT_CONCURRENCY));
    let mut handles = Vec::new();

    for net in cidrs {
        for ip in net.iter() {
            let client = client.clone();
            let sem = semaphore.clone();
            handles.push(tokio::spawn(async move {
                        let _permit = sem.acquire_owned().await.ok()?;
                        probe_host(&client, ip, DiscoverySource::Http).await
            }));
        }
    }

    let mut hits = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Some(hit)) => hits.push(hit),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "discovery probe task panicked"),
        }
    }
    hits
}

/// Drains candidate sightings from the mDNS/SSDP listeners and resolves each
/// one through the same HTTP classification probe the CIDR scanner uses,
/// forwarding confirmed hits to `out`. Runs until the channel closes.
pub async fn resolve_passive_hits(
    mut rx: tokio::sync::mpsc::Receiver<crate::RawHit>,
    out: tokio::sync::mpsc::Sender<DiscoveredDevice>,
) {
    let client = reqwest::Client::new();
    while let Some(hit) = rx.recv().await {
        if let Some(device) = probe_host(&client, hit.ip, hit.source).await {
            if out.send(device).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn probe_host_classifies_gen1_settings_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
        .and(path("/shelly"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
        Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                        "device": {"type": "SHSW-PM", "mac": "AABBCCDDEE01"}
        })))
        .mount(&server)
        .await;

        // wiremock binds to 127.0.0.1 by default.
        let ip = Ipv4Addr::LOCALHOST;
        let client = reqwest::Client::new();
        let port = server.address().port();
        let hit = probe_host_at(&client, ip, port, DiscoverySource::Http).await;
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().mac.as_str(), "AABBCCDDEE01");
    }
}
