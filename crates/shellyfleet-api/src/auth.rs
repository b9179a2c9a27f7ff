use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

/// Requires the rotatable admin key, accepted three ways: an
/// `Authorization: Bearer <key>` header, an `X-API-Key: <key>` header, or
/// (WebSocket upgrade routes only, since browsers cannot set custom headers
/// on a WS handshake) a `?token=<key>` query parameter.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = bearer_token(&request).or_else(|| api_key_header(&request)).or_else(|| query_token(&request));

    let expected = state.admin_key.read().await.clone();
    match provided {
        Some(token) if !expected.is_empty() && token == expected => next.run(request).await,
        _ => ApiError::unauthorized("missing or invalid admin credential").into_response(),
    }
}

fn bearer_token(request: &Request) -> Option<String> {
    request
    .headers()
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|s| s.strip_prefix("Bearer "))
    .map(str::to_string)
}

fn api_key_header(request: &Request) -> Option<String> {
    request.headers().get("x-api-key").and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn query_token(request: &Request) -> Option<String> {
    let query = request.uri().query()?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == "token").then(|| v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use axum::Router;
    use shellyfleet_store::MemoryStore;
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn test_state(key: &str) -> AppState {
        let store: Arc<dyn shellyfleet_store::Storage> = Arc::new(MemoryStore::new());
        let (security, _rx) = shellyfleet_security::SecurityState::new(shellyfleet_security::SecurityConfig::default());
        AppState {
            store: store.clone(),
            clients: Arc::new(shellyfleet_client::ClientRegistry::new(shellyfleet_client::DeviceAuth::default())),
            sync_registry: Arc::new(shellyfleet_sync::default_registry()),
            orchestrator: Arc::new(shellyfleet_provisioning::Orchestrator::new(store.clone())),
            dispatcher: Arc::new(shellyfleet_notify::Dispatcher::new(store.clone(), shellyfleet_notify::default_drivers())),
            templates: Arc::new(shellyfleet_devicecfg::TemplateCache::new()),
            metrics: Arc::new(shellyfleet_metrics::MetricsBus::default()),
            ws_connections: Arc::new(shellyfleet_metrics::ConnectionTracker::new()),
            ws_hub: Arc::new(shellyfleet_metrics::WsHubConfig::default()),
            security,
            config: Arc::new(shellyfleet_config::AppConfig::default()),
            admin_key: Arc::new(RwLock::new(key.to_string())),
        }
    }

    fn router(key: &str) -> Router {
        let state = test_state(key);
        Router::new()
        .route("/admin", get(ok_handler))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state)
    }

    #[tokio::test]
    async fn bearer_token_with_correct_key_is_accepted() {
        let app = router("secret");
        let resp = app
        .oneshot(HttpRequest::builder().uri("/admin").header("Authorization", "Bearer secret").body(Body::empty()).unwrap())
        .await
        .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn api_key_header_with_correct_key_is_accepted() {
        let app = router("secret");
        let resp = app
        .oneshot(HttpRequest::builder().uri("/admin").header("x-api-key", "secret").body(Body::empty()).unwrap())
        .await
        .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn query_token_with_correct_key_is_accepted() {
        let app = router("secret");
        let resp = app.oneshot(HttpRequest::builder().uri("/admin?token=secret").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_credential_is_rejected() {
        let app = router("secret");
        let resp = app.oneshot(HttpRequest::builder().uri("/admin").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_credential_is_rejected() {
        let app = router("secret");
        let resp = app
        .oneshot(HttpRequest::builder().uri("/admin").header("x-api-key", "wrong").body(Body::empty()).unwrap())
        .await
        .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
