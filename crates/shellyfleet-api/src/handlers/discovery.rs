use axum::extract::State;
use axum::Json;
use ipnetwork::Ipv4Network;
use serde::Deserialize;
use shellyfleet_domain::{DiscoveredDevice, Envelope};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub cidrs: Vec<String>,
}

/// `POST /api/v1/discover` — probes every host in the given CIDRs and
/// upserts each classified hit into the discovered-devices table.
pub async fn discover(State(state): State<AppState>, Json(body): Json<DiscoverRequest>) -> Result<Json<Envelope<Vec<DiscoveredDevice>>>, ApiError> {
    let mut nets = Vec::with_capacity(body.cidrs.len());
    for raw in &body.cidrs {
        let net: Ipv4Network = raw.parse().map_err(|_| ApiError::validation(format!("invalid CIDR '{raw}'")))?;
        nets.push(net);
    }
    let hits = shellyfleet_discovery::scan(&nets).await;
    for hit in &hits {
        state.store.upsert_discovered_device(hit.clone()).await?;
    }
    Ok(Json(Envelope::ok(hits)))
}

/// `GET /api/v1/provisioner/discovered-devices` — the current discovered
/// inventory, expired rows purged first.
pub async fn list_discovered(State(state): State<AppState>) -> Result<Json<Envelope<Vec<DiscoveredDevice>>>, ApiError> {
    state.store.purge_expired_discovered_devices().await?;
    let devices = state.store.list_discovered_devices().await?;
    Ok(Json(Envelope::ok(devices)))
}
