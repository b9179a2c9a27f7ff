use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use shellyfleet_domain::{
    AuditEvent, DeliveryEvent, Device, DeviceConfiguration, DiscoveredDevice, MacAddress,
    NotificationChannel, NotificationRule, PageParams, ProvisioningAgent, ProvisioningTask,
    Schedule, SyncRun, TaskState, Template,
};
use uuid::Uuid;

use crate::error::StoreError;
use crate::filter::{DeliveryEventFilter, DeviceFilter, SyncRunFilter};
use crate::store::Storage;

const DEVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("devices");
const DISCOVERED: TableDefinition<&str, &[u8]> = TableDefinition::new("discovered_devices");
const CONFIGS: TableDefinition<&str, &[u8]> = TableDefinition::new("device_configurations");
const TEMPLATES: TableDefinition<&str, &[u8]> = TableDefinition::new("templates");
const SYNC_RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_runs");
const SCHEDULES: TableDefinition<&str, &[u8]> = TableDefinition::new("schedules");
const CHANNELS: TableDefinition<&str, &[u8]> = TableDefinition::new("notification_channels");
const RULES: TableDefinition<&str, &[u8]> = TableDefinition::new("notification_rules");
const DELIVERIES: TableDefinition<&str, &[u8]> = TableDefinition::new("delivery_events");
const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("provisioning_tasks");
const AGENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("provisioning_agents");
const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("audit_events");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const ALL_TABLES: &[TableDefinition<&str, &[u8]>] = &[
    DEVICES, DISCOVERED, CONFIGS, TEMPLATES, SYNC_RUNS, SCHEDULES, CHANNELS, RULES, DELIVERIES,
    TASKS, AGENTS, EVENTS,
];

fn internal(e: impl std::fmt::Display) -> StoreError {
    StoreError::Internal(e.to_string())
}

/// Single-file embedded store: one `TableDefinition` per entity
/// collection, JSON-serialized values, forward-only migration stamp in
/// `meta`. All state survives process restarts.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(internal)?;
        }
        let db = Database::create(path).map_err(internal)?;
        {
            let wtxn = db.begin_write().map_err(internal)?;
            for table in ALL_TABLES {
                wtxn.open_table(*table).map_err(internal)?;
            }
            wtxn.open_table(META).map_err(internal)?;
            wtxn.commit().map_err(internal)?;
        }
        Ok(RedbStore { db: Arc::new(db) })
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let t = rtxn.open_table(table).map_err(internal)?;
        match t.get(key).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn list_json<T: serde::de::DeserializeOwned>(&self, table: TableDefinition<&str, &[u8]>) -> Result<Vec<T>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let t = rtxn.open_table(table).map_err(internal)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    fn put_json<T: serde::Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut t = wtxn.open_table(table).map_err(internal)?;
            t.insert(key, bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    fn remove(&self, table: TableDefinition<&str, &[u8]>, key: &str) -> Result<(), StoreError> {
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut t = wtxn.open_table(table).map_err(internal)?;
            t.remove(key).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }
}

fn paginate<T>(mut items: Vec<T>, page: PageParams) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let start = (page.offset() as usize).min(items.len());
    let end = (start + page.page_size as usize).min(items.len());
    items = items.split_off(start);
    items.truncate(end - start);
    (items, total)
}

#[async_trait]
impl Storage for RedbStore {
    async fn get_device(&self, id: Uuid) -> Result<Option<Device>, StoreError> {
        self.get_json(DEVICES, &id.to_string())
    }

    async fn get_device_by_mac(&self, mac: &MacAddress) -> Result<Option<Device>, StoreError> {
        Ok(self.list_json::<Device>(DEVICES)?.into_iter().find(|d| &d.mac == mac))
    }

    async fn list_devices(&self, filter: &DeviceFilter, page: PageParams) -> Result<(Vec<Device>, u64), StoreError> {
        let mut items: Vec<Device> = self
        .list_json::<Device>(DEVICES)?
        .into_iter()
        .filter(|d| filter.include_deleted || d.deleted_at.is_none())
        .filter(|d| filter.status.map_or(true, |s| d.status == s))
        .filter(|d| filter.family_model_contains.as_ref().map_or(true, |n| d.model.contains(n.as_str())))
        .collect();
        items.sort_by_key(|d| d.created_at);
        Ok(paginate(items, page))
    }

    async fn upsert_device(&self, mut device: Device) -> Result<Device, StoreError> {
        if let Some(existing) = self.get_device_by_mac(&device.mac).await? {
            if existing.id != device.id {
                return Err(StoreError::Conflict(format!("mac {} already belongs to device {}", device.mac, existing.id)));
            }
        }
        device.updated_at = Utc::now();
        device.rev += 1;
        self.put_json(DEVICES, &device.id.to_string(), &device)?;
        Ok(device)
    }

    async fn bulk_upsert_devices_by_mac(&self, devices: Vec<Device>) -> Result<Vec<Device>, StoreError> {
        let mut out = Vec::with_capacity(devices.len());
        for mut device in devices {
            if let Some(existing) = self.get_device_by_mac(&device.mac).await? {
                device.id = existing.id;
                device.created_at = existing.created_at;
                device.rev = existing.rev + 1;
            }
            device.updated_at = Utc::now();
            self.put_json(DEVICES, &device.id.to_string(), &device)?;
            out.push(device);
        }
        Ok(out)
    }

    async fn soft_delete_device(&self, id: Uuid) -> Result<(), StoreError> {
        let mut device = self.get_device(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        device.deleted_at = Some(Utc::now());
        device.updated_at = Utc::now();
        self.put_json(DEVICES, &id.to_string(), &device)
    }

    async fn upsert_discovered_device(&self, device: DiscoveredDevice) -> Result<(), StoreError> {
        self.put_json(DISCOVERED, device.mac.as_str(), &device)
    }

    async fn list_discovered_devices(&self) -> Result<Vec<DiscoveredDevice>, StoreError> {
        self.list_json(DISCOVERED)
    }

    async fn purge_expired_discovered_devices(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let all: Vec<DiscoveredDevice> = self.list_json(DISCOVERED)?;
        let mut purged = 0u64;
        for d in all {
            if d.expires_at <= now {
                self.remove(DISCOVERED, d.mac.as_str())?;
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn get_device_configuration(&self, device_id: Uuid) -> Result<Option<DeviceConfiguration>, StoreError> {
        self.get_json(CONFIGS, &device_id.to_string())
    }

    async fn upsert_device_configuration(&self, mut cfg: DeviceConfiguration) -> Result<DeviceConfiguration, StoreError> {
        cfg.updated_at = Utc::now();
        self.put_json(CONFIGS, &cfg.device_id.to_string(), &cfg)?;
        Ok(cfg)
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<Template>, StoreError> {
        self.get_json(TEMPLATES, &id.to_string())
    }

    async fn get_template_by_name(&self, name: &str) -> Result<Option<Template>, StoreError> {
        Ok(self.list_json::<Template>(TEMPLATES)?.into_iter().find(|t| t.name == name))
    }

    async fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        self.list_json(TEMPLATES)
    }

    async fn upsert_template(&self, mut template: Template) -> Result<Template, StoreError> {
        template.updated_at = Utc::now();
        self.put_json(TEMPLATES, &template.id.to_string(), &template)?;
        Ok(template)
    }

    async fn delete_template(&self, id: Uuid) -> Result<(), StoreError> {
        self.remove(TEMPLATES, &id.to_string())
    }

    async fn insert_sync_run(&self, run: SyncRun) -> Result<SyncRun, StoreError> {
        self.put_json(SYNC_RUNS, &run.id.to_string(), &run)?;
        Ok(run)
    }

    async fn update_sync_run(&self, run: SyncRun) -> Result<SyncRun, StoreError> {
        if self.get_json::<SyncRun>(SYNC_RUNS, &run.id.to_string())?.is_none() {
            return Err(StoreError::NotFound(run.id.to_string()));
        }
        self.put_json(SYNC_RUNS, &run.id.to_string(), &run)?;
        Ok(run)
    }

    async fn list_sync_runs(&self, filter: &SyncRunFilter, page: PageParams) -> Result<(Vec<SyncRun>, u64), StoreError> {
        let mut items: Vec<SyncRun> = self
        .list_json::<SyncRun>(SYNC_RUNS)?
        .into_iter()
        .filter(|r| filter.plugin.as_ref().map_or(true, |p| &r.plugin == p))
        .filter(|r| filter.role.map_or(true, |role| r.role == role))
        .filter(|r| filter.success.map_or(true, |s| r.success == Some(s)))
        .collect();
        items.sort_by_key(|r| r.started);
        items.reverse();
        Ok(paginate(items, page))
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, StoreError> {
        self.get_json(SCHEDULES, &id.to_string())
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        self.list_json(SCHEDULES)
    }

    async fn upsert_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
        self.put_json(SCHEDULES, &schedule.id.to_string(), &schedule)?;
        Ok(schedule)
    }

    async fn delete_schedule(&self, id: Uuid) -> Result<(), StoreError> {
        self.remove(SCHEDULES, &id.to_string())
    }

    async fn list_notification_channels(&self) -> Result<Vec<NotificationChannel>, StoreError> {
        self.list_json(CHANNELS)
    }

    async fn get_notification_channel(&self, id: Uuid) -> Result<Option<NotificationChannel>, StoreError> {
        self.get_json(CHANNELS, &id.to_string())
    }

    async fn upsert_notification_channel(&self, channel: NotificationChannel) -> Result<NotificationChannel, StoreError> {
        self.put_json(CHANNELS, &channel.id.to_string(), &channel)?;
        Ok(channel)
    }

    async fn list_notification_rules(&self) -> Result<Vec<NotificationRule>, StoreError> {
        self.list_json(RULES)
    }

    async fn upsert_notification_rule(&self, rule: NotificationRule) -> Result<NotificationRule, StoreError> {
        self.put_json(RULES, &rule.id.to_string(), &rule)?;
        Ok(rule)
    }

    async fn record_delivery_event(&self, event: DeliveryEvent) -> Result<DeliveryEvent, StoreError> {
        self.put_json(DELIVERIES, &event.id.to_string(), &event)?;
        Ok(event)
    }

    async fn list_delivery_events(&self, filter: &DeliveryEventFilter, page: PageParams) -> Result<(Vec<DeliveryEvent>, u64), StoreError> {
        let mut items: Vec<DeliveryEvent> = self
        .list_json::<DeliveryEvent>(DELIVERIES)?
        .into_iter()
        .filter(|e| filter.channel_id.map_or(true, |id| e.channel_id == id))
        .filter(|e| filter.status.map_or(true, |s| e.status == s))
        .collect();
        items.sort_by_key(|e| e.created_at);
        items.reverse();
        Ok(paginate(items, page))
    }

    async fn get_provisioning_task(&self, id: Uuid) -> Result<Option<ProvisioningTask>, StoreError> {
        self.get_json(TASKS, &id.to_string())
    }

    async fn list_provisioning_tasks(&self) -> Result<Vec<ProvisioningTask>, StoreError> {
        self.list_json(TASKS)
    }

    async fn upsert_provisioning_task(&self, task: ProvisioningTask) -> Result<ProvisioningTask, StoreError> {
        let non_terminal = !matches!(task.state, TaskState::Completed | TaskState::Failed | TaskState::Cancelled);
        if non_terminal {
            let conflict = self.list_json::<ProvisioningTask>(TASKS)?.into_iter().any(|t| {
                    t.id != task.id
                    && t.target_ap_ssid == task.target_ap_ssid
                    && !matches!(t.state, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
            });
            if conflict {
                return Err(StoreError::Conflict(format!("a non-terminal task already targets {}", task.target_ap_ssid)));
            }
        }
        self.put_json(TASKS, &task.id.to_string(), &task)?;
        Ok(task)
    }

    async fn get_provisioning_agent(&self, id: Uuid) -> Result<Option<ProvisioningAgent>, StoreError> {
        self.get_json(AGENTS, &id.to_string())
    }

    async fn list_provisioning_agents(&self) -> Result<Vec<ProvisioningAgent>, StoreError> {
        self.list_json(AGENTS)
    }

    async fn upsert_provisioning_agent(&self, agent: ProvisioningAgent) -> Result<ProvisioningAgent, StoreError> {
        self.put_json(AGENTS, &agent.id.to_string(), &agent)?;
        Ok(agent)
    }

    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError> {
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut meta = wtxn.open_table(META).map_err(internal)?;
            let seq = meta.get("event_seq").map_err(internal)?.map(|g| g.value()).unwrap_or(0) + 1;
            meta.insert("event_seq", seq).map_err(internal)?;
            let mut events = wtxn.open_table(EVENTS).map_err(internal)?;
            let bytes = serde_json::to_vec(&event)?;
            events.insert(format!("{seq:020}").as_str(), bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn list_events(&self, limit: u32) -> Result<Vec<AuditEvent>, StoreError> {
        let mut all: Vec<AuditEvent> = self.list_json(EVENTS)?;
        all.sort_by_key(|e| e.at);
        all.reverse();
        all.truncate(limit as usize);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use shellyfleet_domain::{AuditKind, DeviceFamily, DeviceGeneration, DeviceStatus};
    use tempfile::TempDir;

    fn device(mac: &str) -> Device {
        let now = Utc::now();
        Device {
            id: Uuid::new_v4(),
            mac: MacAddress::parse(mac).unwrap(),
            ip: "192.168.1.2".parse().unwrap(),
            generation: DeviceGeneration::Gen1,
            family: DeviceFamily::Gen1RelayPM,
            model: "SHSW-PM".into(),
            name: "kitchen".into(),
            firmware: "x".into(),
            status: DeviceStatus::Online,
            last_seen: now,
            settings: Value::Null,
            rev: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.redb");
        let id;
        {
            let store = RedbStore::open(&path).unwrap();
            let d = store.upsert_device(device("AA:BB:CC:DD:EE:01")).await.unwrap();
            id = d.id;
        }
        {
            let store = RedbStore::open(&path).unwrap();
            let got = store.get_device(id).await.unwrap();
            assert!(got.is_some());
        }
    }

    #[tokio::test]
    async fn events_append_and_list_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("s.redb")).unwrap();
        store.append_event(AuditEvent::new(AuditKind::DiscoveryPromoted { mac: "a".into() })).await.unwrap();
        store.append_event(AuditEvent::new(AuditKind::DiscoveryPromoted { mac: "b".into() })).await.unwrap();
        let events = store.list_events(10).await.unwrap();
        assert_eq!(events.len(), 2);
    }
}
