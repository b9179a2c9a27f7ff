pub mod config;
pub mod error;
mod loader;
mod raw;

pub use config::{
    AppConfig, DiscoveryConfig, ExportConfig, ImportConfig, MetricsConfig, SecurityConfig,
    ServerConfig, StorageConfig, StorageProvider,
};
pub use error::ConfigError;
pub use loader::{load, load_raw_file, resolve};
pub use raw::RawConfig;
