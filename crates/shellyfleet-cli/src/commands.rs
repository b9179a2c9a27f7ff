use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use ipnetwork::Ipv4Network;
use shellyfleet_config::{AppConfig, StorageProvider};
use shellyfleet_domain::{Device, DeviceFamily, DeviceGeneration, DeviceStatus};
use shellyfleet_store::{MemoryStore, PostgresStore, RedbStore, Storage};
use shellyfleet_sync::{
    run_export, run_import, Compression, ConflictStrategy, ExportFilters, ExportRequest,
    ExportRunResult, ImportEntityKind, ImportRequest, ImportRunResult,
};
use uuid::Uuid;

use crate::output;

/// Exit codes that are part of this CLI's externally-observable contract;
/// anything else unexpected falls through `main`'s generic error path (1).
pub const EXIT_NETWORK_ERROR: i32 = 2;
pub const EXIT_CONFLICT: i32 = 3;
pub const EXIT_FORBIDDEN_PATH: i32 = 4;
pub const EXIT_PLUGIN_ERROR: i32 = 5;
pub const EXIT_VALIDATION_ERROR: i32 = 6;

/// Opens the storage backend named by `config.storage`, the same backend
/// the `server` subcommand would use — so `add`/`export`/`import` act on
/// the fleet's real state rather than a throwaway copy.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn Storage>> {
    let store: Arc<dyn Storage> = match config.storage.provider {
        StorageProvider::Memory => Arc::new(MemoryStore::new()),
        StorageProvider::Redb => {
            let path = PathBuf::from(&config.storage.path);
            Arc::new(RedbStore::open(&path).with_context(|| format!("failed to open store at {}", path.display()))?)
        }
        StorageProvider::Postgres => {
            let dsn = config.storage.dsn.as_deref().context("storage.dsn is required for the postgres provider")?;
            Arc::new(PostgresStore::connect(dsn).await.context("failed to connect to postgres")?)
        }
    };
    Ok(store)
}

// ── discover ──────────────────────────────────────────────────────────────

pub async fn discover(cidr: String) -> Result<i32> {
    let net: Ipv4Network = match cidr.parse() {
        Ok(n) => n,
        Err(e) => {
            eprintln!("invalid CIDR '{cidr}': {e}");
            return Ok(EXIT_NETWORK_ERROR);
        }
    };

    let hits = shellyfleet_discovery::scan(&[net]).await;
    println!("{}", output::render_discovered(&hits));
    Ok(0)
}

// ── add ───────────────────────────────────────────────────────────────────

/// Probes `ip` live to learn its MAC/generation/model, then registers it
/// under `name`. A device that never answers has no MAC to key a record
/// on, so an unreachable probe is a hard failure here rather than the
/// best-effort fallback the provisioner's `report-device` handler uses.
pub async fn add(config: &AppConfig, ip: Ipv4Addr, name: String) -> Result<i32> {
    let store = open_store(config).await?;

    let client = reqwest::Client::new();
    let hit = shellyfleet_discovery::probe_host(&client, ip, shellyfleet_domain::DiscoverySource::Http)
    .await
    .with_context(|| format!("{ip} did not answer a discovery probe"))?;

    let body: serde_json::Value = client
    .get(format!("http://{ip}/shelly"))
    .send()
    .await
    .context("device probe succeeded but the follow-up classification request failed")?
    .json()
    .await
    .unwrap_or(serde_json::json!({}));
    let (family, model) = shellyfleet_discovery::classify(&body);
    let mac = hit.mac;

    if let Some(existing) = store.get_device_by_mac(&mac).await? {
        eprintln!("conflict: {mac} already registered as device {} ({})", existing.id, existing.name);
        return Ok(EXIT_CONFLICT);
    }

    let now = Utc::now();
    let device = Device {
        id: Uuid::new_v4(),
        mac: mac.clone(),
        ip,
        generation: if family == DeviceFamily::Gen2 { DeviceGeneration::Gen2Plus } else { DeviceGeneration::Gen1 },
        family,
        model,
        name,
        firmware: String::new(),
        status: DeviceStatus::Online,
        last_seen: now,
        settings: serde_json::json!({}),
        rev: 0,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    match store.upsert_device(device.clone()).await {
        Ok(saved) => {
            println!("added {} as {} ({})", saved.mac, saved.name, saved.id);
            Ok(0)
        }
        Err(e) if e.kind() == shellyfleet_domain::ErrorKind::Conflict => {
            eprintln!("conflict: {e}");
            Ok(EXIT_CONFLICT)
        }
        Err(e) => Err(e.into()),
    }
}

// ── export ────────────────────────────────────────────────────────────────

pub async fn export(config: &AppConfig, format: String, output_dir: PathBuf, compression: String) -> Result<i32> {
    let store = open_store(config).await?;
    let registry = shellyfleet_sync::default_registry();

    let compression = match compression.parse::<Compression>() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid --compression: {e}");
            return Ok(EXIT_VALIDATION_ERROR);
        }
    };

    let request = ExportRequest {
        plugin: format,
        filters: ExportFilters::default(),
        preview: false,
        compression,
        output_subpath: None,
    };

    match run_export(store.as_ref(), &registry, Path::new(&output_dir), request).await {
        Ok(ExportRunResult::Written(run)) => {
            println!("wrote {}", run.output_path.unwrap_or_default());
            Ok(0)
        }
        Ok(ExportRunResult::Preview(_)) => unreachable!("cli export never requests a preview"),
        Err(e) => {
            let code = match e.kind() {
                shellyfleet_domain::ErrorKind::Forbidden => EXIT_FORBIDDEN_PATH,
                _ => EXIT_PLUGIN_ERROR,
            };
            eprintln!("export failed: {e}");
            Ok(code)
        }
    }
}

// ── import ────────────────────────────────────────────────────────────────

pub async fn import(config: &AppConfig, format: String, file: PathBuf, dry_run: bool) -> Result<i32> {
    let store = open_store(config).await?;
    let registry = shellyfleet_sync::default_registry();

    let payload = match tokio::fs::read(&file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("cannot read {}: {e}", file.display());
            return Ok(EXIT_VALIDATION_ERROR);
        }
    };

    let request = ImportRequest {
        plugin: format,
        payload,
        preview: dry_run,
        conflict_strategy: ConflictStrategy::Update,
        entity_kinds: vec![ImportEntityKind::Device, ImportEntityKind::Template],
    };

    match run_import(store.as_ref(), &registry, request).await {
        Ok(ImportRunResult::Preview(preview)) => {
            println!("{}", output::render_import_preview(&preview));
            Ok(0)
        }
        Ok(ImportRunResult::Applied { outcome, .. }) => {
            println!("applied: {} created, {} updated, {} skipped", outcome.created, outcome.updated, outcome.skipped);
            Ok(0)
        }
        Err(e) if e.kind() == shellyfleet_domain::ErrorKind::Validation || e.kind() == shellyfleet_domain::ErrorKind::Corrupt => {
            eprintln!("import rejected: {e}");
            Ok(EXIT_VALIDATION_ERROR)
        }
        Err(e) => {
            eprintln!("import failed: {e}");
            Ok(EXIT_PLUGIN_ERROR)
        }
    }
}

// ── server ────────────────────────────────────────────────────────────────

pub async fn server(config: AppConfig) -> Result<i32> {
    let store = open_store(&config).await?;
    let clients = Arc::new(shellyfleet_client::ClientRegistry::new(shellyfleet_client::DeviceAuth::default()));
    let sync_registry = Arc::new(shellyfleet_sync::default_registry());
    let orchestrator = Arc::new(shellyfleet_provisioning::Orchestrator::new(store.clone()));
    let dispatcher = Arc::new(shellyfleet_notify::Dispatcher::new(store.clone(), shellyfleet_notify::default_drivers()));
    let templates = Arc::new(shellyfleet_devicecfg::TemplateCache::new());
    let metrics = Arc::new(shellyfleet_metrics::MetricsBus::default());
    let ws_connections = Arc::new(shellyfleet_metrics::ConnectionTracker::new());
    let ws_hub = Arc::new(shellyfleet_metrics::WsHubConfig {
        origin_allowlist: config.metrics.ws_origin_allowlist.clone(),
        per_ip_cap: config.metrics.ws_per_ip_cap as usize,
        ..shellyfleet_metrics::WsHubConfig::default()
    });

    let mut security_config = shellyfleet_security::SecurityConfig::default();
    security_config.use_proxy_headers = config.security.use_proxy_headers;
    security_config.trusted_proxies = config
    .security
    .trusted_proxies
    .iter()
    .filter_map(|p| p.parse().ok())
    .collect();
    let (security, mut alerts) = shellyfleet_security::SecurityState::new(security_config);
    security.spawn_cleanup_sweeps();
    tokio::spawn(async move {
        while let Some(alert) = alerts.recv().await {
            tracing::warn!(?alert, "security alert");
        }
    });

    let (sampler_shutdown_tx, sampler_shutdown_rx) = tokio::sync::watch::channel(());
    tokio::spawn(shellyfleet_metrics::run_system_sampler(metrics.clone(), std::time::Duration::from_secs(5), sampler_shutdown_rx));

    let bind = format!("{}:{}", config.server.host, config.server.port);
    let admin_key = config.security.admin_api_key.clone();

    let state = shellyfleet_api::AppState {
        store,
        clients,
        sync_registry,
        orchestrator,
        dispatcher,
        templates,
        metrics,
        ws_connections,
        ws_hub,
        security,
        config: Arc::new(config),
        admin_key: Arc::new(tokio::sync::RwLock::new(admin_key)),
    };

    let app = shellyfleet_api::build_app(state);
    let listener = tokio::net::TcpListener::bind(&bind).await.with_context(|| format!("failed to bind to {bind}"))?;
    tracing::info!(%bind, "shellyfleet manager listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;
    let _ = sampler_shutdown_tx.send(());
    Ok(0)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
