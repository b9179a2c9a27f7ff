use async_trait::async_trait;
use serde_json::{json, Value};
use shellyfleet_domain::{PluginCapabilities, PluginDescriptor, SyncRole};

use crate::error::SyncError;
use crate::plugin::{
    ConflictStrategy, ExportDataSet, ExportOutcome, ExportPreview, ImportOutcome, ImportPreview, SyncPlugin,
};
use crate::sma::{self, RecordCounts};

/// The self-describing archive format: magic header,
/// length-prefixed metadata, gzip-compressed normalized JSON payload.
pub struct SmaPlugin;

impl SmaPlugin {
    pub fn new() -> Self {
        SmaPlugin
    }
}

impl Default for SmaPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn dataset_to_json(data: &ExportDataSet) -> Value {
    json!({
            "devices": data.devices.iter().map(|d| shellyfleet_devicecfg::normalize(&serde_json::to_value(d).unwrap())).collect::<Vec<_>>(),
            "templates": data.templates.iter().map(|t| shellyfleet_devicecfg::normalize(&serde_json::to_value(t).unwrap())).collect::<Vec<_>>(),
            "network_settings": {},
    })
}

#[async_trait]
impl SyncPlugin for SmaPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            name: "sma".into(),
            role: SyncRole::Export,
            formats: vec!["sma".into(), "sma.gz".into()],
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
        let payload = serde_json::to_vec(&tree)?;
        Ok(ExportPreview {
                record_count: data.record_count(),
                estimated_size: payload.len() as u64,
                excerpt: json!({
                        "devices": data.devices.iter().take(3).map(|d| &d.mac).collect::<Vec<_>>(),
                        "templates": data.templates.iter().take(3).map(|t| &t.name).collect::<Vec<_>>(),
                }),
        })
    }

    async fn export_write(&self, data: &ExportDataSet) -> Result<ExportOutcome, SyncError> {
        let tree = dataset_to_json(data);
        let payload = serde_json::to_vec(&tree)?;
        let counts = RecordCounts {
            devices: data.devices.len() as u64,
            templates: data.templates.len() as u64,
        };
        let bundle = sma::write_bundle("shellyfleet-manager", counts, &payload)?;
        Ok(ExportOutcome { bytes: bundle, file_name: "export.sma.gz".into() })
    }

    async fn import_preview(&self, payload: &[u8]) -> Result<ImportPreview, SyncError> {
        let (metadata, tree_bytes) = sma::read_bundle(payload)?;
        let tree: Value = serde_json::from_slice(&tree_bytes)?;
        Ok(ImportPreview {
                will_create: metadata.record_counts.devices,
                will_update: 0,
                will_delete: 0,
                diff_sample: tree.get("devices").cloned().unwrap_or(json!([])),
        })
    }

    async fn import_apply(&self, payload: &[u8], strategy: ConflictStrategy) -> Result<ImportOutcome, SyncError> {
        let (metadata, _tree_bytes) = sma::read_bundle(payload)?;
        let devices = metadata.record_counts.devices;
        match strategy {
            ConflictStrategy::Skip => Ok(ImportOutcome { created: 0, updated: 0, skipped: devices }),
            ConflictStrategy::Update | ConflictStrategy::Merge => {
                Ok(ImportOutcome { created: 0, updated: devices, skipped: 0 })
            }
            ConflictStrategy::Rename => Ok(ImportOutcome { created: devices, updated: 0, skipped: 0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn export_then_import_preview_recovers_counts() {
        let plugin = SmaPlugin::new();
        let data = ExportDataSet::default();
        let outcome = plugin.export_write(&data).await.unwrap();
        assert!(outcome.file_name.ends_with(".sma.gz"));
        let preview = plugin.import_preview(&outcome.bytes).await.unwrap();
        assert_eq!(preview.will_create, 0);
    }

    #[tokio::test]
    async fn import_preview_rejects_corrupt_archive() {
        let plugin = SmaPlugin::new();
        let err = plugin.import_preview(b"garbage").await.unwrap_err();
        assert!(matches!(err, SyncError::Corrupt(_)));
    }
}
