use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::config::{
    AppConfig, DiscoveryConfig, ExportConfig, ImportConfig, MetricsConfig, SecurityConfig,
    ServerConfig, StorageConfig, StorageProvider,
};
use crate::error::ConfigError;
use crate::raw::RawConfig;

const ENV_PREFIX: &str = "SHELLYFLEET_";

/// Read a YAML file into [`RawConfig`]. Returns the default (empty) raw
/// config if `path` doesn't exist — a missing file is not an error, it just
/// means every setting falls through to env vars and then defaults.
pub fn load_raw_file(path: &Path) -> Result<RawConfig, ConfigError> {
    if !path.exists() {
        return Ok(RawConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
    })?;
    serde_yaml::from_str(&text).map_err(|e| ConfigError::YamlParse {
            path: path.display().to_string(),
            source: e,
    })
}

/// Resolve `{ENV_PREFIX}{key}` (nested keys joined by `_`) from `env`, or
/// `None` if unset.
fn env_str(env: &HashMap<String, String>, key: &str) -> Option<String> {
    env.get(&format!("{ENV_PREFIX}{key}")).cloned()
}

/// Resolve a secret value honoring the `_FILE` suffix convention:
/// `{KEY}_FILE` takes precedence over `{KEY}` when both could apply, and
/// points at a path whose (newline-trimmed) contents become the secret.
fn env_secret(
    env: &HashMap<String, String>,
    key: &str,
    read_secret_file: &dyn Fn(&str) -> Result<String, std::io::Error>,
) -> Result<Option<String>, ConfigError> {
    if let Some(path) = env_str(env, &format!("{key}_FILE")) {
        let contents = read_secret_file(&path).map_err(|e| ConfigError::SecretFile {
                key: key.to_string(),
                path,
                source: e,
        })?;
        return Ok(Some(contents.trim_end_matches(['\n', '\r']).to_string()));
    }
    Ok(env_str(env, key))
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
    .map(|p| p.trim().to_string())
    .filter(|p| !p.is_empty())
    .collect()
}

/// Pure merge of `(defaults, file, env)` honoring **env > file > defaults**
///. `read_secret_file` is injected so this stays unit-testable without
/// touching the real filesystem or environment.
pub fn resolve(
    defaults: AppConfig,
    file: RawConfig,
    env: &HashMap<String, String>,
    read_secret_file: &dyn Fn(&str) -> Result<String, std::io::Error>,
) -> Result<AppConfig, ConfigError> {
    let server = ServerConfig {
        port: env_str(env, "SERVER_PORT")
        .and_then(|v| v.parse().ok())
        .or(file.server.port)
        .unwrap_or(defaults.server.port),
        host: env_str(env, "SERVER_HOST")
        .or(file.server.host)
        .unwrap_or(defaults.server.host),
    };

    let admin_api_key = env_secret(env, "SECURITY_ADMIN_API_KEY", read_secret_file)?
    .or(file.security.admin_api_key)
    .unwrap_or(defaults.security.admin_api_key);

    let security = SecurityConfig {
        admin_api_key,
        use_proxy_headers: env_str(env, "SECURITY_USE_PROXY_HEADERS")
        .and_then(|v| v.parse().ok())
        .or(file.security.use_proxy_headers)
        .unwrap_or(defaults.security.use_proxy_headers),
        trusted_proxies: env_str(env, "SECURITY_TRUSTED_PROXIES")
        .map(|v| split_csv(&v))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
                if !file.security.trusted_proxies.is_empty() {
                    file.security.trusted_proxies
                } else {
                    defaults.security.trusted_proxies
                }
        }),
        cors_allow_origins: env_str(env, "SECURITY_CORS_ALLOW_ORIGINS")
        .map(|v| split_csv(&v))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
                if !file.security.cors.allow_origins.is_empty() {
                    file.security.cors.allow_origins
                } else {
                    defaults.security.cors_allow_origins
                }
        }),
    };

    let dsn = env_secret(env, "STORAGE_DSN", read_secret_file)?.or(file.storage.dsn);

    let storage = StorageConfig {
        provider: match env_str(env, "STORAGE_PROVIDER").or(file.storage.provider) {
            Some(s) => s.parse::<StorageProvider>().map_err(|msg| ConfigError::InvalidValue {
                    key: "storage.provider".to_string(),
                    message: msg,
            })?,
            None => defaults.storage.provider,
        },
        dsn: dsn.or(defaults.storage.dsn),
        path: env_str(env, "STORAGE_PATH")
        .or(file.storage.path)
        .unwrap_or(defaults.storage.path),
    };

    let discovery = DiscoveryConfig {
        networks: env_str(env, "DISCOVERY_NETWORKS")
        .map(|v| split_csv(&v))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
                if !file.discovery.networks.is_empty() {
                    file.discovery.networks
                } else {
                    defaults.discovery.networks
                }
        }),
        timeout_secs: env_str(env, "DISCOVERY_TIMEOUT_SECS")
        .and_then(|v| v.parse().ok())
        .or(file.discovery.timeout_secs)
        .unwrap_or(defaults.discovery.timeout_secs),
    };

    let export = ExportConfig {
        output_directory: env_str(env, "EXPORT_OUTPUT_DIRECTORY")
        .or(file.export.output_directory)
        .unwrap_or(defaults.export.output_directory),
    };

    let import = ImportConfig {
        temp_directory: env_str(env, "IMPORT_TEMP_DIRECTORY")
        .or(file.import.temp_directory)
        .unwrap_or(defaults.import.temp_directory),
    };

    let metrics = MetricsConfig {
        ws_origin_allowlist: env_str(env, "METRICS_WS_ORIGIN_ALLOWLIST")
        .map(|v| split_csv(&v))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
                if !file.metrics.ws.origin_allowlist.is_empty() {
                    file.metrics.ws.origin_allowlist
                } else {
                    defaults.metrics.ws_origin_allowlist
                }
        }),
        ws_per_ip_cap: env_str(env, "METRICS_WS_PER_IP_CAP")
        .and_then(|v| v.parse().ok())
        .or(file.metrics.ws.per_ip_cap)
        .unwrap_or(defaults.metrics.ws_per_ip_cap),
    };

    Ok(AppConfig {
            server,
            security,
            storage,
            discovery,
            export,
            import,
            metrics,
    })
}

/// Load the full configuration: YAML file (if present) overlaid by real
/// process environment variables, falling back to [`AppConfig::default`].
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file = match path {
        Some(p) => load_raw_file(p)?,
        None => RawConfig::default(),
    };
    let env: HashMap<String, String> = std::env::vars().collect();
    debug!(keys = env.len(), "loaded process environment");
    resolve(AppConfig::default(), file, &env, &|path| std::fs::read_to_string(path))
}
