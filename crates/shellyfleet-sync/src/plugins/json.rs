use async_trait::async_trait;
use serde_json::{json, Value};
use shellyfleet_domain::{PluginCapabilities, PluginDescriptor, SyncRole};

use crate::error::SyncError;
use crate::plugin::{
    ConflictStrategy, ExportDataSet, ExportOutcome, ExportPreview, ImportOutcome, ImportPreview, SyncPlugin,
};

/// Plain normalized JSON tree, no compression.
pub struct JsonPlugin;

impl JsonPlugin {
    pub fn new() -> Self {
        JsonPlugin
    }
}

impl Default for JsonPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn dataset_to_json(data: &ExportDataSet) -> Value {
    json!({
            "devices": data.devices.iter().map(|d| shellyfleet_devicecfg::normalize(&serde_json::to_value(d).unwrap())).collect::<Vec<_>>(),
            "templates": data.templates.iter().map(|t| shellyfleet_devicecfg::normalize(&serde_json::to_value(t).unwrap())).collect::<Vec<_>>(),
    })
}

#[async_trait]
impl SyncPlugin for JsonPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            name: "json".into(),
            role: SyncRole::Export,
            formats: vec!["json".into()],
            schema: json!({ "type": "object", "properties": {} }),
            capabilities: PluginCapabilities {
                incremental: false,
                scheduling: true,
                auth: false,
                max_size_bytes: None,
                concurrency: 1,
            },
        }
    }

    fn validate_config(&self, _config: &Value) -> Result<(), SyncError> {
        Ok(())
    }

    async fn initialize(&self, _config: &Value) -> Result<(), SyncError> {
        Ok(())
    }

    async fn export_preview(&self, data: &ExportDataSet) -> Result<ExportPreview, SyncError> {
        let tree = dataset_to_json(data);
        let bytes = serde_json::to_vec(&tree)?;
        Ok(ExportPreview {
                record_count: data.record_count(),
                estimated_size: bytes.len() as u64,
                excerpt: json!({
                        "devices": data.devices.iter().take(3).map(|d| &d.mac).collect::<Vec<_>>(),
                }),
        })
    }

    async fn export_write(&self, data: &ExportDataSet) -> Result<ExportOutcome, SyncError> {
        let tree = dataset_to_json(data);
        let bytes = serde_json::to_vec_pretty(&tree)?;
        Ok(ExportOutcome { bytes, file_name: "export.json".into() })
    }

    async fn import_preview(&self, payload: &[u8]) -> Result<ImportPreview, SyncError> {
        let tree: Value = serde_json::from_slice(payload).map_err(|e| SyncError::Corrupt(e.to_string()))?;
        let devices = tree.get("devices").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0) as u64;
        Ok(ImportPreview {
                will_create: devices,
                will_update: 0,
                will_delete: 0,
                diff_sample: tree.get("devices").cloned().unwrap_or(json!([])),
        })
    }

    async fn import_apply(&self, payload: &[u8], strategy: ConflictStrategy) -> Result<ImportOutcome, SyncError> {
        let tree: Value = serde_json::from_slice(payload).map_err(|e| SyncError::Corrupt(e.to_string()))?;
        let devices = tree.get("devices").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0) as u64;
        match strategy {
            ConflictStrategy::Skip => Ok(ImportOutcome { created: 0, updated: 0, skipped: devices }),
            _ => Ok(ImportOutcome { created: devices, updated: 0, skipped: 0 }),
        }
    }
}
