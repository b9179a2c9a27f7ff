use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use shellyfleet_domain::{PageParams, SyncRole, SyncRun, SyncSummary};
use shellyfleet_store::{DeviceFilter, Storage};
use uuid::Uuid;

use crate::error::SyncError;
use crate::plugin::{ConflictStrategy, ExportDataSet, ExportFilters, ExportOutcome, ExportPreview, ImportPreview, ImportOutcome};
use crate::registry::PluginRegistry;

/// Artifact compression. `zip` is named in the spec but no
/// zip-writing crate is in the dependency family this workspace carries
/// (only `flate2`, gzip-only); it is rejected explicitly rather than
/// fabricating a vendored implementation — see `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl std::str::FromStr for Compression {
    type Err = SyncError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "zip" => Err(SyncError::InvalidConfig("zip compression is not supported by this build".into())),
            other => Err(SyncError::InvalidConfig(format!("unknown compression '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub plugin: String,
    pub filters: ExportFilters,
    pub preview: bool,
    pub compression: Compression,
    /// Caller-chosen file name, joined under the configured output
    /// directory. `None` falls back to the plugin's suggested name.
    pub output_subpath: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ExportRunResult {
    Preview(ExportPreview),
    Written(SyncRun),
}

async fn collect_export_dataset(store: &dyn Storage, filters: &ExportFilters) -> Result<ExportDataSet, SyncError> {
    let (mut devices, _total) = store.list_devices(&DeviceFilter::default(), PageParams::clamp(Some(1), Some(100))).await?;
    if let Some(ids) = &filters.device_ids {
        devices.retain(|d| ids.contains(&d.id));
    }
    let templates = if filters.include_templates {
        store.list_templates().await?
    } else {
        Vec::new()
    };
    Ok(ExportDataSet { devices, templates })
}

/// Canonicalizes `output_dir` (creating it if absent, mirroring the
/// `export.output_directory` startup contract) and rejects any requested
/// subpath whose lexically-normalized form escapes it.
fn resolve_output_path(output_dir: &Path, requested: &str) -> Result<PathBuf, SyncError> {
    std::fs::create_dir_all(output_dir).map_err(SyncError::Io)?;
    let base = output_dir.canonicalize().map_err(SyncError::Io)?;
    let joined = base.join(requested);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(SyncError::ForbiddenPath(requested.to_string()));
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    if !normalized.starts_with(&base) {
        return Err(SyncError::ForbiddenPath(requested.to_string()));
    }
    Ok(normalized)
}

fn apply_compression(compression: Compression, outcome: ExportOutcome) -> Result<(Vec<u8>, String), SyncError> {
    match compression {
        Compression::None => Ok((outcome.bytes, outcome.file_name)),
        Compression::Gzip => {
            use std::io::Write;
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&outcome.bytes)?;
            let compressed = encoder.finish()?;
            let file_name = if outcome.file_name.ends_with(".gz") {
                outcome.file_name
            } else {
                format!("{}.gz", outcome.file_name)
            };
            Ok((compressed, file_name))
        }
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

/// Runs the export pipeline: resolve, preview
/// gate, collect, write-under-output-directory, compress, checksum,
/// persist a `SyncRun`.
pub async fn run_export(
    store: &dyn Storage,
    registry: &PluginRegistry,
    output_directory: &Path,
    request: ExportRequest,
) -> Result<ExportRunResult, SyncError> {
    let plugin = registry.for_role_name(SyncRole::Export, &request.plugin)?;
    plugin.validate_config(&json!({}))?;

    let data = collect_export_dataset(store, &request.filters).await?;

    if request.preview {
        let preview = plugin.export_preview(&data).await?;
        return Ok(ExportRunResult::Preview(preview));
    }

    let started = Utc::now();
    let run = SyncRun {
        id: Uuid::new_v4(),
        plugin: request.plugin.clone(),
        role: SyncRole::Export,
        started,
        finished: None,
        success: None,
        summary: None,
        output_path: None,
        error: None,
    };
    let run = store.insert_sync_run(run).await?;

    let result = async {
        let outcome = plugin.export_write(&data).await?;
        let (bytes, file_name) = apply_compression(request.compression, outcome)?;
        let requested = request.output_subpath.clone().unwrap_or(file_name);
        let path = resolve_output_path(output_directory, &requested)?;
        tokio::fs::write(&path, &bytes).await?;
        let checksum = hex_sha256(&bytes);
        Ok::<_, SyncError>((path, bytes.len() as u64, checksum))
    }
    .await;

    let mut finished = run;
    finished.finished = Some(Utc::now());
    match result {
        Ok((path, bytes, checksum)) => {
            finished.success = Some(true);
            finished.summary = Some(SyncSummary { records: data.record_count(), bytes, checksum });
            finished.output_path = Some(path.display().to_string());
        }
        Err(e) => {
            finished.success = Some(false);
            finished.error = Some(e.to_string());
            let finished = store.update_sync_run(finished).await?;
            let _ = finished; // persisted failure record; propagate original error to caller
            return Err(e);
        }
    }
    let finished = store.update_sync_run(finished).await?;
    Ok(ExportRunResult::Written(finished))
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub plugin: String,
    pub payload: Vec<u8>,
    pub preview: bool,
    pub conflict_strategy: ConflictStrategy,
    /// Entities the strategy applies to. Restricted to `Device`/`Template`
    /// at first pass; anything else is rejected with
    /// `UnsupportedStrategy` rather than silently ignored.
    pub entity_kinds: Vec<ImportEntityKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportEntityKind {
    Device,
    Template,
    Other,
}

#[derive(Debug, Clone)]
pub enum ImportRunResult {
    Preview(ImportPreview),
    Applied { run: SyncRun, outcome: ImportOutcome },
}

/// Runs the import pipeline: preview is mandatory-first — even a
/// non-preview call computes the preview/backup before applying, so a
/// failed apply can roll back to the pre-apply snapshot.
pub async fn run_import(
    store: &dyn Storage,
    registry: &PluginRegistry,
    request: ImportRequest,
) -> Result<ImportRunResult, SyncError> {
    for kind in &request.entity_kinds {
        if matches!(kind, ImportEntityKind::Other) {
            return Err(SyncError::UnsupportedStrategy(format!("{:?}", request.conflict_strategy), "other".into()));
        }
    }

    let plugin = registry.for_role_name(shellyfleet_domain::SyncRole::Import, &request.plugin)?;
    plugin.validate_config(&json!({}))?;

    let preview = plugin.import_preview(&request.payload).await?;
    if request.preview {
        return Ok(ImportRunResult::Preview(preview));
    }

    // Backup-before-apply snapshot: capture current devices so
    // a failed apply can be rolled back to this point.
    let (backup_devices, _) = store.list_devices(&DeviceFilter::default(), PageParams::clamp(Some(1), Some(100))).await?;

    let started = Utc::now();
    let run = SyncRun {
        id: Uuid::new_v4(),
        plugin: request.plugin.clone(),
        role: shellyfleet_domain::SyncRole::Import,
        started,
        finished: None,
        success: None,
        summary: None,
        output_path: None,
        error: None,
    };
    let run = store.insert_sync_run(run).await?;

    match plugin.import_apply(&request.payload, request.conflict_strategy).await {
        Ok(outcome) => {
            let mut finished = run;
            finished.finished = Some(Utc::now());
            finished.success = Some(true);
            finished.summary = Some(SyncSummary {
                    records: outcome.created + outcome.updated,
                    bytes: request.payload.len() as u64,
                    checksum: hex_sha256(&request.payload),
            });
            let finished = store.update_sync_run(finished).await?;
            Ok(ImportRunResult::Applied { run: finished, outcome })
        }
        Err(e) => {
            // Roll back to the pre-apply snapshot.
            store.bulk_upsert_devices_by_mac(backup_devices).await?;
            let mut finished = run;
            finished.finished = Some(Utc::now());
            finished.success = Some(false);
            finished.error = Some(e.to_string());
            store.update_sync_run(finished).await?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::json::JsonPlugin;
    use shellyfleet_store::MemoryStore;
    use std::sync::Arc;

    fn registry() -> PluginRegistry {
        let mut r = PluginRegistry::new();
        r.register(SyncRole::Export, Arc::new(JsonPlugin::new()));
        r.register(SyncRole::Import, Arc::new(JsonPlugin::new()));
        r
    }

    #[tokio::test]
    async fn export_preview_writes_no_file() {
        let store = MemoryStore::new();
        let registry = registry();
        let dir = tempfile::tempdir().unwrap();
        let req = ExportRequest {
            plugin: "json".into(),
            filters: ExportFilters::default(),
            preview: true,
            compression: Compression::None,
            output_subpath: None,
        };
        let result = run_export(&store, &registry, dir.path(), req).await.unwrap();
        assert!(matches!(result, ExportRunResult::Preview(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn export_write_creates_file_under_output_directory() {
        let store = MemoryStore::new();
        let registry = registry();
        let dir = tempfile::tempdir().unwrap();
        let req = ExportRequest {
            plugin: "json".into(),
            filters: ExportFilters::default(),
            preview: false,
            compression: Compression::None,
            output_subpath: None,
        };
        let result = run_export(&store, &registry, dir.path(), req).await.unwrap();
        match result {
            ExportRunResult::Written(run) => {
                assert!(run.success.unwrap());
                let path = run.output_path.unwrap();
                assert!(std::path::Path::new(&path).exists());
            }
            _ => panic!("expected Written"),
        }
    }

    #[tokio::test]
    async fn export_rejects_path_escaping_output_directory() {
        let store = MemoryStore::new();
        let registry = registry();
        let dir = tempfile::tempdir().unwrap();
        let req = ExportRequest {
            plugin: "json".into(),
            filters: ExportFilters::default(),
            preview: false,
            compression: Compression::None,
            output_subpath: Some("../../etc/passwd".into()),
        };
        let err = run_export(&store, &registry, dir.path(), req).await.unwrap_err();
        assert!(matches!(err, SyncError::ForbiddenPath(_)));
    }

    #[tokio::test]
    async fn import_preview_never_mutates_store() {
        let store = MemoryStore::new();
        let registry = registry();
        let payload = br#"{"devices":[]}"#.to_vec();
        let req = ImportRequest {
            plugin: "json".into(),
            payload,
            preview: true,
            conflict_strategy: ConflictStrategy::Update,
            entity_kinds: vec![ImportEntityKind::Device],
        };
        let result = run_import(&store, &registry, req).await.unwrap();
        assert!(matches!(result, ImportRunResult::Preview(_)));
        let (devices, _) = store.list_devices(&DeviceFilter::default(), PageParams::clamp(Some(1), Some(20))).await.unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn import_unsupported_entity_kind_is_rejected() {
        let store = MemoryStore::new();
        let registry = registry();
        let req = ImportRequest {
            plugin: "json".into(),
            payload: br#"{"devices":[]}"#.to_vec(),
            preview: false,
            conflict_strategy: ConflictStrategy::Merge,
            entity_kinds: vec![ImportEntityKind::Other],
        };
        let err = run_import(&store, &registry, req).await.unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedStrategy(_, _)));
    }
}
