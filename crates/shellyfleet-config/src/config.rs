/// Fully resolved configuration: every field is concrete, having already
/// passed through the env > file > defaults precedence chain.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
    pub discovery: DiscoveryConfig,
    pub export: ExportConfig,
    pub import: ImportConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityConfig {
    pub admin_api_key: String,
    pub use_proxy_headers: bool,
    pub trusted_proxies: Vec<String>,
    pub cors_allow_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub dsn: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    Memory,
    Redb,
    Postgres,
}

impl std::str::FromStr for StorageProvider {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StorageProvider::Memory),
            "redb" => Ok(StorageProvider::Redb),
            "postgres" => Ok(StorageProvider::Postgres),
            other => Err(format!("unknown storage provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub networks: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    pub output_directory: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub temp_directory: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub ws_origin_allowlist: Vec<String>,
    pub ws_per_ip_cap: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig {
                port: 8080,
                host: "0.0.0.0".to_string(),
            },
            security: SecurityConfig {
                admin_api_key: String::new(),
                use_proxy_headers: false,
                trusted_proxies: Vec::new(),
                cors_allow_origins: Vec::new(),
            },
            storage: StorageConfig {
                provider: StorageProvider::Memory,
                dsn: None,
                path: "shellyfleet.redb".to_string(),
            },
            discovery: DiscoveryConfig {
                networks: Vec::new(),
                timeout_secs: 2,
            },
            export: ExportConfig {
                output_directory: "./export".to_string(),
            },
            import: ImportConfig {
                temp_directory: "./import-tmp".to_string(),
            },
            metrics: MetricsConfig {
                ws_origin_allowlist: Vec::new(),
                ws_per_ip_cap: 4,
            },
        }
    }
}
