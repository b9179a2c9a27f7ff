use std::sync::Arc;

use shellyfleet_client::ClientRegistry;
use shellyfleet_config::AppConfig;
use shellyfleet_devicecfg::TemplateCache;
use shellyfleet_metrics::{ConnectionTracker, MetricsBus, WsHubConfig};
use shellyfleet_notify::Dispatcher;
use shellyfleet_provisioning::Orchestrator;
use shellyfleet_security::SecurityState;
use shellyfleet_store::Storage;
use shellyfleet_sync::PluginRegistry;
use tokio::sync::RwLock;

/// Everything a handler needs, built once at startup in `main` and cloned
/// cheaply (everything is `Arc`-backed) into every request via axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub clients: Arc<ClientRegistry>,
    pub sync_registry: Arc<PluginRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub dispatcher: Arc<Dispatcher>,
    pub templates: Arc<TemplateCache>,
    pub metrics: Arc<MetricsBus>,
    pub ws_connections: Arc<ConnectionTracker>,
    pub ws_hub: Arc<WsHubConfig>,
    pub security: SecurityState,
    pub config: Arc<AppConfig>,
    /// Rotatable admin credential checked by [`crate::auth::require_admin`].
    /// A `RwLock<String>` rather than an `ArcSwap` since rotation is rare
    /// and every read is already behind an `await` in handler code.
    pub admin_key: Arc<RwLock<String>>,
}
