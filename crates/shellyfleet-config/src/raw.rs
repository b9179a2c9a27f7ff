use serde::{Deserialize, Serialize};

/// Deserialized shape of the YAML config file. Every field is optional so a
/// partial file is valid; absent fields fall through to env vars and then to
/// [`crate::AppConfig::defaults`].
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawConfig {
    #[serde(default)]
    pub server: RawServer,
    #[serde(default)]
    pub security: RawSecurity,
    #[serde(default)]
    pub storage: RawStorage,
    #[serde(default)]
    pub discovery: RawDiscovery,
    #[serde(default)]
    pub export: RawExport,
    #[serde(default)]
    pub import: RawImport,
    #[serde(default)]
    pub metrics: RawMetrics,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawServer {
    pub port: Option<u16>,
    pub host: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawSecurity {
    pub admin_api_key: Option<String>,
    pub admin_api_key_file: Option<String>,
    pub use_proxy_headers: Option<bool>,
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    #[serde(default)]
    pub cors: RawCors,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawCors {
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawStorage {
    pub provider: Option<String>,
    pub dsn: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawDiscovery {
    #[serde(default)]
    pub networks: Vec<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawExport {
    pub output_directory: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawImport {
    pub temp_directory: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawMetrics {
    #[serde(default)]
    pub ws: RawMetricsWs,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawMetricsWs {
    #[serde(default)]
    pub origin_allowlist: Vec<String>,
    pub per_ip_cap: Option<u32>,
}
