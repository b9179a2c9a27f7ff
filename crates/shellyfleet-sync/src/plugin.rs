use async_trait::async_trait;
use serde_json::Value;
use shellyfleet_domain::{Device, PluginDescriptor, Template};

use crate::error::SyncError;

/// What to export, resolved by the pipeline before handing records to a
/// plugin.
#[derive(Debug, Clone, Default)]
pub struct ExportFilters {
    pub device_ids: Option<Vec<uuid::Uuid>>,
    pub include_templates: bool,
}

/// The resolved data set a plugin writes out, assembled by the pipeline so
/// individual plugins never query storage directly.
#[derive(Debug, Clone, Default)]
pub struct ExportDataSet {
    pub devices: Vec<Device>,
    pub templates: Vec<Template>,
}

impl ExportDataSet {
    pub fn record_count(&self) -> u64 {
        (self.devices.len() + self.templates.len()) as u64
    }
}

/// Result of a non-preview export write.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub bytes: Vec<u8>,
    /// Suggested filename, relative to the output directory.
    pub file_name: String,
}

/// `(record_count, estimated_size)` plus a representative excerpt, produced
/// in preview mode without writing anything.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExportPreview {
    pub record_count: u64,
    pub estimated_size: u64,
    pub excerpt: Value,
}

/// Conflict resolution strategy for import apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    Update,
    Rename,
    Merge,
    Skip,
}

/// `(will_create, will_update, will_delete)` counts plus a diff sample,
/// computed without mutating state.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ImportPreview {
    pub will_create: u64,
    pub will_update: u64,
    pub will_delete: u64,
    pub diff_sample: Value,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ImportOutcome {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
}

/// Pluggable export/import unit. `schema` is validated against the
/// caller-supplied config before any execution step runs; everything else
/// follows the lifecycle `Initialize -> Serve -> Cleanup`.
#[async_trait]
pub trait SyncPlugin: Send + Sync {
    fn descriptor(&self) -> PluginDescriptor;

    /// Structural validation of `config` against `descriptor().schema`.
    /// Field-level errors are folded into a single `InvalidConfig` message;
    /// the API layer is responsible for splitting it back out if it wants
    /// per-field detail.
    fn validate_config(&self, config: &Value) -> Result<(), SyncError>;

    async fn initialize(&self, config: &Value) -> Result<(), SyncError>;

    async fn export_preview(&self, data: &ExportDataSet) -> Result<ExportPreview, SyncError>;

    async fn export_write(&self, data: &ExportDataSet) -> Result<ExportOutcome, SyncError>;

    async fn import_preview(&self, payload: &[u8]) -> Result<ImportPreview, SyncError>;

    /// Applies the payload using `strategy`, returning counts. Callers are
    /// expected to have already captured a backup snapshot (pipeline
    /// responsibility, not the plugin's).
    async fn import_apply(&self, payload: &[u8], strategy: ConflictStrategy) -> Result<ImportOutcome, SyncError>;

    async fn cleanup(&self) -> Result<(), SyncError> {
        Ok(())
    }
}
