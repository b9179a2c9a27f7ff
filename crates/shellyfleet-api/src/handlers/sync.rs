use std::path::Path as FsPath;
use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use shellyfleet_domain::{Envelope, Pagination, Schedule, SyncRole, SyncRun};
use shellyfleet_store::SyncRunFilter;
use shellyfleet_sync::{
    run_export, run_import, Compression, ConflictStrategy, ExportFilters, ExportRequest,
    ExportRunResult, ImportEntityKind, ImportRequest, ImportRunResult,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::PageQuery;
use crate::state::AppState;

fn parse_entity_kind(raw: &str) -> Result<ImportEntityKind, ApiError> {
    match raw {
        "device" => Ok(ImportEntityKind::Device),
        "template" => Ok(ImportEntityKind::Template),
        other => Err(ApiError::validation(format!("unsupported entity kind '{other}'"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportRequestBody {
    pub plugin: String,
    #[serde(default)]
    pub device_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub include_templates: bool,
    #[serde(default)]
    pub preview: bool,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default)]
    pub output_subpath: Option<String>,
}

fn default_compression() -> String {
    "none".to_string()
}

/// `POST /api/v1/export`.
pub async fn export(State(state): State<AppState>, Json(body): Json<ExportRequestBody>) -> Result<Json<Envelope<Value>>, ApiError> {
    let compression = Compression::from_str(&body.compression).map_err(ApiError::from)?;
    let request = ExportRequest {
        plugin: body.plugin,
        filters: ExportFilters { device_ids: body.device_ids, include_templates: body.include_templates },
        preview: body.preview,
        compression,
        output_subpath: body.output_subpath,
    };
    let output_dir = FsPath::new(&state.config.export.output_directory);
    let result = run_export(state.store.as_ref(), state.sync_registry.as_ref(), output_dir, request).await?;
    let body = match result {
        ExportRunResult::Preview(preview) => serde_json::to_value(preview).unwrap_or(Value::Null),
        ExportRunResult::Written(run) => serde_json::to_value(sync_run_view(&run)).unwrap_or(Value::Null),
    };
    Ok(Json(Envelope::ok(body)))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequestBody {
    pub plugin: String,
    pub payload_base64: String,
    #[serde(default)]
    pub preview: bool,
    #[serde(default = "default_conflict_strategy")]
    pub conflict_strategy: ConflictStrategy,
    pub entity_kinds: Vec<String>,
}

fn default_conflict_strategy() -> ConflictStrategy {
    ConflictStrategy::Update
}

/// `POST /api/v1/import`. The payload travels as base64 inside the JSON
/// envelope rather than as a raw multipart body, matching this API's
/// JSON-only content-type allowlist.
pub async fn import(State(state): State<AppState>, Json(body): Json<ImportRequestBody>) -> Result<Json<Envelope<Value>>, ApiError> {
    let payload = BASE64.decode(&body.payload_base64).map_err(|e| ApiError::validation(format!("invalid base64 payload: {e}")))?;
    let entity_kinds = body.entity_kinds.iter().map(|s| parse_entity_kind(s)).collect::<Result<Vec<_>, _>>()?;
    let request = ImportRequest {
        plugin: body.plugin,
        payload,
        preview: body.preview,
        conflict_strategy: body.conflict_strategy,
        entity_kinds,
    };
    let result = run_import(state.store.as_ref(), state.sync_registry.as_ref(), request).await?;
    let body = match result {
        ImportRunResult::Preview(preview) => serde_json::to_value(preview).unwrap_or(Value::Null),
        ImportRunResult::Applied { run, outcome } => {
            serde_json::json!({ "run": sync_run_view(&run), "outcome": outcome })
        }
    };
    Ok(Json(Envelope::ok(body)))
}

fn sync_run_view(run: &SyncRun) -> Value {
    serde_json::to_value(run).unwrap_or(Value::Null)
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub plugin: Option<String>,
    pub success: Option<bool>,
}

async fn history(state: &AppState, role: SyncRole, query: HistoryQuery) -> Result<Envelope<Vec<SyncRun>>, ApiError> {
    let filter = SyncRunFilter { plugin: query.plugin, role: Some(role), success: query.success };
    let page = query.page.clamp();
    let (runs, total) = state.store.list_sync_runs(&filter, page).await?;
    Ok(Envelope::ok_with_pagination(runs, Pagination::new(page, total)))
}

pub async fn export_history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Result<Json<Envelope<Vec<SyncRun>>>, ApiError> {
    Ok(Json(history(&state, SyncRole::Export, query).await?))
}

pub async fn import_history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Result<Json<Envelope<Vec<SyncRun>>>, ApiError> {
    Ok(Json(history(&state, SyncRole::Import, query).await?))
}

pub async fn list_schedules(State(state): State<AppState>) -> Result<Json<Envelope<Vec<Schedule>>>, ApiError> {
    let schedules = state.store.list_schedules().await?;
    Ok(Json(Envelope::ok(schedules)))
}

pub async fn get_schedule(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<Schedule>>, ApiError> {
    let schedule = state.store.get_schedule(id).await?.ok_or_else(|| ApiError::not_found("schedule not found"))?;
    Ok(Json(Envelope::ok(schedule)))
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub plugin: String,
    pub interval_sec: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub request: Value,
}

fn default_true() -> bool {
    true
}

pub async fn create_schedule(State(state): State<AppState>, Json(body): Json<CreateScheduleRequest>) -> Result<Json<Envelope<Schedule>>, ApiError> {
    let schedule = Schedule {
        id: Uuid::new_v4(),
        plugin: body.plugin,
        interval_sec: body.interval_sec,
        enabled: body.enabled,
        request: body.request,
        last_run: None,
        next_run: Some(Utc::now()),
    };
    let schedule = state.store.upsert_schedule(schedule).await?;
    Ok(Json(Envelope::ok(schedule)))
}

pub async fn delete_schedule(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<()>>, ApiError> {
    state.store.delete_schedule(id).await?;
    Ok(Json(Envelope::ok(())))
}

/// `POST /api/v1/export/schedules/{id}/run` — runs the schedule immediately,
/// outside its normal tick, and advances `next_run` from this run.
pub async fn run_schedule_now(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<Value>>, ApiError> {
    let mut schedule = state.store.get_schedule(id).await?.ok_or_else(|| ApiError::not_found("schedule not found"))?;
    let request = ExportRequest {
        plugin: schedule.plugin.clone(),
        filters: ExportFilters::default(),
        preview: false,
        compression: Compression::Gzip,
        output_subpath: None,
    };
    let output_dir = FsPath::new(&state.config.export.output_directory);
    let ran_at = Utc::now();
    let result = run_export(state.store.as_ref(), state.sync_registry.as_ref(), output_dir, request).await?;
    shellyfleet_sync::scheduler::advance(&mut schedule, ran_at);
    state.store.upsert_schedule(schedule).await?;
    let body = match result {
        ExportRunResult::Preview(preview) => serde_json::to_value(preview).unwrap_or(Value::Null),
        ExportRunResult::Written(run) => sync_run_view(&run),
    };
    Ok(Json(Envelope::ok(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_entity_kind_is_rejected() {
        let err = parse_entity_kind("other").unwrap_err();
        assert_eq!(err.kind, shellyfleet_domain::ErrorKind::Validation);
    }

    #[test]
    fn known_entity_kinds_parse() {
        assert_eq!(parse_entity_kind("device").unwrap(), ImportEntityKind::Device);
        assert_eq!(parse_entity_kind("template").unwrap(), ImportEntityKind::Template);
    }
}
