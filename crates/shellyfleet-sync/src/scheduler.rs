use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shellyfleet_domain::Schedule;
use shellyfleet_store::Storage;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::pipeline::{run_export, Compression, ExportRequest};
use crate::plugin::ExportFilters;
use crate::registry::PluginRegistry;

/// Default scheduler tick.
pub const DEFAULT_TICK_SECS: u64 = 15;

/// Pure function over "now" and the schedule list: which schedules are due
/// right now, excluding any whose previous run is still in flight.
pub fn due_schedules(schedules: &[Schedule], in_flight: &HashSet<Uuid>, now: chrono::DateTime<Utc>) -> Vec<Schedule> {
    schedules
    .iter()
    .filter(|s| s.enabled && !in_flight.contains(&s.id))
    .filter(|s| s.next_run.map(|next| now >= next).unwrap_or(true))
    .cloned()
    .collect()
}

/// `next_run = last_run + interval` after every completion.
pub fn advance(schedule: &mut Schedule, ran_at: chrono::DateTime<Utc>) {
    schedule.last_run = Some(ran_at);
    schedule.next_run = Some(ran_at + chrono::Duration::seconds(schedule.interval_sec as i64));
}

/// Single-threaded dispatcher: a `tokio::select!` ticker
/// against a shutdown signal, grounded on the async-task-with-shutdown-signal
/// idiom. `in_flight` guards the "never two concurrent runs per
/// schedule" invariant across ticks.
pub async fn run(
    store: Arc<dyn Storage>,
    registry: Arc<PluginRegistry>,
    output_directory: PathBuf,
    tick: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let in_flight: Arc<Mutex<HashSet<Uuid>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut ticker = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tick_once(&store, &registry, &output_directory, &in_flight).await {
                    error!(error = %e, "schedule tick failed");
                }
            }
            _ = shutdown.changed() => {
                info!("sync scheduler shutting down");
                break;
            }
        }
    }
}

async fn tick_once(
    store: &Arc<dyn Storage>,
    registry: &Arc<PluginRegistry>,
    output_directory: &std::path::Path,
    in_flight: &Arc<Mutex<HashSet<Uuid>>>,
) -> Result<(), shellyfleet_store::StoreError> {
    let schedules = store.list_schedules().await?;
    let now = Utc::now();
    let due = {
        let guard = in_flight.lock().await;
        due_schedules(&schedules, &guard, now)
    };

    for schedule in due {
        {
            let mut guard = in_flight.lock().await;
            guard.insert(schedule.id);
        }
        let store = store.clone();
        let registry = registry.clone();
        let output_directory = output_directory.to_path_buf();
        let in_flight = in_flight.clone();
        tokio::spawn(async move {
                let request = ExportRequest {
                    plugin: schedule.plugin.clone(),
                    filters: ExportFilters::default(),
                    preview: false,
                    compression: Compression::Gzip,
                    output_subpath: None,
                };
                let ran_at = Utc::now();
                if let Err(e) = run_export(store.as_ref(), registry.as_ref(), &output_directory, request).await {
                    warn!(schedule_id = %schedule.id, error = %e, "scheduled sync run failed");
                }
                let mut updated = schedule.clone();
                advance(&mut updated, ran_at);
                if let Err(e) = store.upsert_schedule(updated).await {
                    error!(schedule_id = %schedule.id, error = %e, "failed to advance schedule next_run");
                }
                in_flight.lock().await.remove(&schedule.id);
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(id: Uuid, next_run: Option<chrono::DateTime<Utc>>) -> Schedule {
        Schedule {
            id,
            plugin: "json".into(),
            interval_sec: 900,
            enabled: true,
            request: serde_json::json!({}),
            last_run: None,
            next_run,
        }
    }

    #[test]
    fn due_schedules_skips_in_flight() {
        let now = Utc::now();
        let s = schedule(Uuid::new_v4(), Some(now - chrono::Duration::seconds(1)));
        let mut in_flight = HashSet::new();
        in_flight.insert(s.id);
        let due = due_schedules(&[s], &in_flight, now);
        assert!(due.is_empty());
    }

    #[test]
    fn due_schedules_includes_never_run_and_past_due() {
        let now = Utc::now();
        let never_run = schedule(Uuid::new_v4(), None);
        let past_due = schedule(Uuid::new_v4(), Some(now - chrono::Duration::seconds(5)));
        let future = schedule(Uuid::new_v4(), Some(now + chrono::Duration::seconds(5)));
        let due = due_schedules(&[never_run.clone(), past_due.clone(), future], &HashSet::new(), now);
        assert_eq!(due.len(), 2);
        assert!(due.iter().any(|s| s.id == never_run.id));
        assert!(due.iter().any(|s| s.id == past_due.id));
    }

    #[test]
    fn advance_sets_next_run_to_last_run_plus_interval() {
        let mut s = schedule(Uuid::new_v4(), None);
        let now = Utc::now();
        advance(&mut s, now);
        assert_eq!(s.last_run, Some(now));
        assert_eq!(s.next_run, Some(now + chrono::Duration::seconds(s.interval_sec as i64)));
    }

    #[test]
    fn disabled_schedule_is_never_due() {
        let mut s = schedule(Uuid::new_v4(), None);
        s.enabled = false;
        let due = due_schedules(&[s], &HashSet::new(), Utc::now());
        assert!(due.is_empty());
    }
}
