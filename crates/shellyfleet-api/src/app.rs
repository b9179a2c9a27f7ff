use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use shellyfleet_security::security_chain;
use tower_http::trace::TraceLayer;

use crate::auth::require_admin;
use crate::handlers::{admin, deviceconfig, devices, discovery, health, metrics, notifications, provisioner, sync};
use crate::state::AppState;

/// No-op pass-through, used to skip `require_admin` on the routes the
/// provisioner agent protocol itself has no credential for (the agent
/// binary predates the admin-key rotation feature and speaks to these
/// endpoints unauthenticated, trusting its position on the local network).
async fn no_auth(request: axum::extract::Request, next: axum::middleware::Next) -> axum::response::Response {
    next.run(request).await
}

pub fn build_app(state: AppState) -> Router {
    let device_routes = Router::new()
    .route("/", get(devices::list).post(devices::create))
    .route("/:id", get(devices::get).put(devices::update).delete(devices::delete))
    .route("/:id/config", get(deviceconfig::get_desired_raw).put(deviceconfig::put_desired))
    .route("/:id/config/typed", get(deviceconfig::get_desired_typed))
    .route("/:id/config/typed/normalized", get(deviceconfig::get_desired_typed_normalized))
    .route("/:id/config/current", get(deviceconfig::get_current_raw))
    .route("/:id/config/current/normalized", get(deviceconfig::get_current_normalized))
    .route("/:id/config/import", post(deviceconfig::import_desired))
    .route("/:id/config/export", post(deviceconfig::export_desired))
    .route("/:id/drift", get(deviceconfig::drift));

    let sync_routes = Router::new()
    .route("/export", post(sync::export))
    .route("/import", post(sync::import))
    .route("/export/history", get(sync::export_history))
    .route("/import/history", get(sync::import_history))
    .route("/export/schedules", get(sync::list_schedules).post(sync::create_schedule))
    .route("/export/schedules/:id", get(sync::get_schedule).delete(sync::delete_schedule))
    .route("/export/schedules/:id/run", post(sync::run_schedule_now));

    let notification_routes = Router::new()
    .route("/channels", get(notifications::list_channels).post(notifications::create_channel))
    .route("/rules", get(notifications::list_rules).post(notifications::create_rule))
    .route("/history", get(notifications::history))
    .route("/test", post(notifications::test_notification));

    let admin_gated = Router::new()
    .nest("/api/v1/devices", device_routes)
    .nest("/api/v1", sync_routes)
    .nest("/api/v1/notifications", notification_routes)
    .route("/api/v1/discover", post(discovery::discover))
    .route("/api/v1/provisioner/discovered-devices", get(discovery::list_discovered))
    .route("/api/v1/admin/rotate-admin-key", post(admin::rotate_admin_key))
    .route("/metrics/health", get(metrics::health))
    .route("/metrics/system", get(metrics::system))
    .route("/metrics/devices", get(metrics::devices))
    .route("/metrics/drift", get(metrics::drift))
    .route("/metrics/notifications", get(metrics::notifications))
    .route("/metrics/ws", get(metrics::ws_metrics))
    .route_layer(from_fn_with_state(state.clone(), require_admin));

    // Unauthenticated: the agent protocol (no credential to present) and
    // the liveness probes a load balancer hits before any key exists.
    let open = Router::new()
    .route("/healthz", get(health::healthz))
    .route("/readyz", get(health::readyz))
    .route("/provisioner/agents", post(provisioner::register_agent))
    .route("/provisioner/agents/:agent_id/heartbeat", post(provisioner::heartbeat))
    .route("/provisioner/tasks/next", get(provisioner::next_task))
    .route("/provisioner/tasks/:task_id/progress", post(provisioner::report_progress))
    .route("/provisioner/report-device", post(provisioner::report_device))
    .route_layer(from_fn(no_auth));

    Router::new()
    .merge(admin_gated)
    .merge(open)
    .route_layer(from_fn_with_state(state.security.clone(), security_chain))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use shellyfleet_store::MemoryStore;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::util::ServiceExt;

    const TEST_KEY: &str = "test-admin-key";

    fn test_app() -> Router {
        let store: Arc<dyn shellyfleet_store::Storage> = Arc::new(MemoryStore::new());
        let (security, _rx) = shellyfleet_security::SecurityState::new(shellyfleet_security::SecurityConfig::default());
        let state = AppState {
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
            admin_key: Arc::new(RwLock::new(TEST_KEY.to_string())),
        };
        build_app(state)
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {}", TEST_KEY))
    }

    fn with_peer(mut req: Request<Body>) -> Request<Body> {
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        req
    }

    #[tokio::test]
    async fn healthz_needs_no_auth() {
        let app = test_app();
        let resp = app.oneshot(with_peer(Request::builder().uri("/healthz").body(Body::empty()).unwrap())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_needs_no_auth() {
        let app = test_app();
        let resp = app.oneshot(with_peer(Request::builder().uri("/readyz").body(Body::empty()).unwrap())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn devices_list_without_admin_key_is_unauthorized() {
        let app = test_app();
        let resp = app.oneshot(with_peer(Request::builder().uri("/api/v1/devices").body(Body::empty()).unwrap())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn devices_list_with_admin_key_is_ok() {
        let app = test_app();
        let resp = app.oneshot(with_peer(authed(Request::builder().uri("/api/v1/devices")).body(Body::empty()).unwrap())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn device_not_found_returns_404() {
        let app = test_app();
        let uri = format!("/api/v1/devices/{}", uuid::Uuid::new_v4());
        let resp = app.oneshot(with_peer(authed(Request::builder().uri(uri)).body(Body::empty()).unwrap())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn provisioner_register_requires_no_admin_key() {
        let app = test_app();
        let body = serde_json::json!({ "hostname": "agent-1", "capabilities": [] });
        let req = Request::builder()
        .method("POST")
        .uri("/provisioner/agents")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
        let resp = app.oneshot(with_peer(req)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
