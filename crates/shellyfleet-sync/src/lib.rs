pub mod error;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod scheduler;
pub mod sma;

pub use error::SyncError;
pub use pipeline::{run_export, run_import, Compression, ExportRequest, ExportRunResult, ImportEntityKind, ImportRequest, ImportRunResult};
pub use plugin::{ConflictStrategy, ExportDataSet, ExportFilters, ExportOutcome, ExportPreview, ImportOutcome, ImportPreview, SyncPlugin};
pub use plugins::json::JsonPlugin;
pub use plugins::sma_plugin::SmaPlugin;
pub use registry::PluginRegistry;

/// Builds the registry with both built-in plugins registered for their
/// supported roles.
pub fn default_registry() -> PluginRegistry {
    use std::sync::Arc;
    let mut registry = PluginRegistry::new();
    registry.register(shellyfleet_domain::SyncRole::Export, Arc::new(JsonPlugin::new()));
    registry.register(shellyfleet_domain::SyncRole::Import, Arc::new(JsonPlugin::new()));
    registry.register(shellyfleet_domain::SyncRole::Export, Arc::new(SmaPlugin::new()));
    registry.register(shellyfleet_domain::SyncRole::Import, Arc::new(SmaPlugin::new()));
    registry
}
