use axum::extract::State;
use axum::Json;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;
use shellyfleet_domain::Envelope;

use crate::state::AppState;

const ADMIN_KEY_LEN: usize = 32;

/// `POST /api/v1/admin/rotate-admin-key` — generates a fresh admin
/// credential and swaps it in. The new key is returned exactly once; it is
/// never persisted to storage or logged.
pub async fn rotate_admin_key(State(state): State<AppState>) -> Json<Envelope<serde_json::Value>> {
    let new_key: String = rand::thread_rng().sample_iter(&Alphanumeric).take(ADMIN_KEY_LEN).map(char::from).collect();
    *state.admin_key.write().await = new_key.clone();
    Json(Envelope::ok(json!({ "admin_key": new_key })))
}
