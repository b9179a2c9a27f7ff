use axum::extract::State;
use axum::Json;
use shellyfleet_domain::Envelope;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn healthz() -> Json<Envelope<&'static str>> {
    Json(Envelope::ok("ok"))
}

/// Proves the storage backend actually answers, not just that the process
/// is up.
pub async fn readyz(State(state): State<AppState>) -> Result<Json<Envelope<&'static str>>, ApiError> {
    state.store.ready().await?;
    Ok(Json(Envelope::ok("ready")))
}
