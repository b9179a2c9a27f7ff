use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use shellyfleet_domain::{
    AuditEvent, DeliveryEvent, Device, DeviceConfiguration, DiscoveredDevice, MacAddress,
    NotificationChannel, NotificationRule, PageParams, ProvisioningAgent,
    ProvisioningTask, Schedule, SyncRun, TaskState, Template,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::filter::{DeliveryEventFilter, DeviceFilter, SyncRunFilter};
use crate::store::Storage;

#[derive(Debug, Default)]
struct Inner {
    devices: HashMap<Uuid, Device>,
    discovered: HashMap<MacAddress, DiscoveredDevice>,
    configurations: HashMap<Uuid, DeviceConfiguration>,
    templates: HashMap<Uuid, Template>,
    sync_runs: HashMap<Uuid, SyncRun>,
    schedules: HashMap<Uuid, Schedule>,
    channels: HashMap<Uuid, NotificationChannel>,
    rules: HashMap<Uuid, NotificationRule>,
    deliveries: Vec<DeliveryEvent>,
    tasks: HashMap<Uuid, ProvisioningTask>,
    agents: HashMap<Uuid, ProvisioningAgent>,
    events: Vec<AuditEvent>,
}

/// `tokio::sync::RwLock<Inner>` over `HashMap`s — ephemeral, for tests and
/// the CLI's ephemeral mode.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(items: Vec<T>, page: PageParams) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let start = page.offset() as usize;
    let page_items = items.into_iter().skip(start).take(page.page_size as usize).collect();
    (page_items, total)
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get_device(&self, id: Uuid) -> Result<Option<Device>, StoreError> {
        Ok(self.inner.read().await.devices.get(&id).cloned())
    }

    async fn get_device_by_mac(&self, mac: &MacAddress) -> Result<Option<Device>, StoreError> {
        Ok(self.inner.read().await.devices.values().find(|d| &d.mac == mac).cloned())
    }

    async fn list_devices(
        &self,
        filter: &DeviceFilter,
        page: PageParams,
    ) -> Result<(Vec<Device>, u64), StoreError> {
        let guard = self.inner.read().await;
        let mut items: Vec<Device> = guard
        .devices
        .values()
        .filter(|d| filter.include_deleted || d.deleted_at.is_none())
        .filter(|d| filter.status.map_or(true, |s| d.status == s))
        .filter(|d| {
                filter
                .family_model_contains
                .as_ref()
                .map_or(true, |needle| d.model.contains(needle.as_str()))
        })
        .cloned()
        .collect();
        items.sort_by_key(|d| d.created_at);
        Ok(paginate(items, page))
    }

    async fn upsert_device(&self, mut device: Device) -> Result<Device, StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.devices.values().find(|d| d.mac == device.mac && d.id != device.id) {
            return Err(StoreError::Conflict(format!(
                        "mac {} already belongs to device {}",
                        device.mac, existing.id
            )));
        }
        device.updated_at = Utc::now();
        device.rev += 1;
        guard.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn bulk_upsert_devices_by_mac(&self, devices: Vec<Device>) -> Result<Vec<Device>, StoreError> {
        let mut guard = self.inner.write().await;
        let mut out = Vec::with_capacity(devices.len());
        for mut device in devices {
            if let Some(existing) = guard.devices.values().find(|d| d.mac == device.mac) {
                device.id = existing.id;
                device.created_at = existing.created_at;
                device.rev = existing.rev + 1;
            }
            device.updated_at = Utc::now();
            guard.devices.insert(device.id, device.clone());
            out.push(device);
        }
        Ok(out)
    }

    async fn soft_delete_device(&self, id: Uuid) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let device = guard.devices.get_mut(&id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        device.deleted_at = Some(Utc::now());
        device.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_discovered_device(&self, device: DiscoveredDevice) -> Result<(), StoreError> {
        self.inner.write().await.discovered.insert(device.mac.clone(), device);
        Ok(())
    }

    async fn list_discovered_devices(&self) -> Result<Vec<DiscoveredDevice>, StoreError> {
        Ok(self.inner.read().await.discovered.values().cloned().collect())
    }

    async fn purge_expired_discovered_devices(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut guard = self.inner.write().await;
        let before = guard.discovered.len();
        guard.discovered.retain(|_, d| d.expires_at > now);
        Ok((before - guard.discovered.len()) as u64)
    }

    async fn get_device_configuration(&self, device_id: Uuid) -> Result<Option<DeviceConfiguration>, StoreError> {
        Ok(self.inner.read().await.configurations.get(&device_id).cloned())
    }

    async fn upsert_device_configuration(&self, mut cfg: DeviceConfiguration) -> Result<DeviceConfiguration, StoreError> {
        cfg.updated_at = Utc::now();
        self.inner.write().await.configurations.insert(cfg.device_id, cfg.clone());
        Ok(cfg)
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<Template>, StoreError> {
        Ok(self.inner.read().await.templates.get(&id).cloned())
    }

    async fn get_template_by_name(&self, name: &str) -> Result<Option<Template>, StoreError> {
        Ok(self.inner.read().await.templates.values().find(|t| t.name == name).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        Ok(self.inner.read().await.templates.values().cloned().collect())
    }

    async fn upsert_template(&self, mut template: Template) -> Result<Template, StoreError> {
        template.updated_at = Utc::now();
        self.inner.write().await.templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn delete_template(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.write().await.templates.remove(&id);
        Ok(())
    }

    async fn insert_sync_run(&self, run: SyncRun) -> Result<SyncRun, StoreError> {
        self.inner.write().await.sync_runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn update_sync_run(&self, run: SyncRun) -> Result<SyncRun, StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.sync_runs.contains_key(&run.id) {
            return Err(StoreError::NotFound(run.id.to_string()));
        }
        guard.sync_runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn list_sync_runs(
        &self,
        filter: &SyncRunFilter,
        page: PageParams,
    ) -> Result<(Vec<SyncRun>, u64), StoreError> {
        let guard = self.inner.read().await;
        let mut items: Vec<SyncRun> = guard
        .sync_runs
        .values()
        .filter(|r| filter.plugin.as_ref().map_or(true, |p| &r.plugin == p))
        .filter(|r| filter.role.map_or(true, |role| r.role == role))
        .filter(|r| filter.success.map_or(true, |s| r.success == Some(s)))
        .cloned()
        .collect();
        items.sort_by_key(|r| r.started);
        items.reverse();
        Ok(paginate(items, page))
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, StoreError> {
        Ok(self.inner.read().await.schedules.get(&id).cloned())
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        Ok(self.inner.read().await.schedules.values().cloned().collect())
    }

    async fn upsert_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
        self.inner.write().await.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn delete_schedule(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.write().await.schedules.remove(&id);
        Ok(())
    }

    async fn list_notification_channels(&self) -> Result<Vec<NotificationChannel>, StoreError> {
        Ok(self.inner.read().await.channels.values().cloned().collect())
    }

    async fn get_notification_channel(&self, id: Uuid) -> Result<Option<NotificationChannel>, StoreError> {
        Ok(self.inner.read().await.channels.get(&id).cloned())
    }

    async fn upsert_notification_channel(&self, channel: NotificationChannel) -> Result<NotificationChannel, StoreError> {
        self.inner.write().await.channels.insert(channel.id, channel.clone());
        Ok(channel)
    }

    async fn list_notification_rules(&self) -> Result<Vec<NotificationRule>, StoreError> {
        Ok(self.inner.read().await.rules.values().cloned().collect())
    }

    async fn upsert_notification_rule(&self, rule: NotificationRule) -> Result<NotificationRule, StoreError> {
        self.inner.write().await.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn record_delivery_event(&self, event: DeliveryEvent) -> Result<DeliveryEvent, StoreError> {
        self.inner.write().await.deliveries.push(event.clone());
        Ok(event)
    }

    async fn list_delivery_events(
        &self,
        filter: &DeliveryEventFilter,
        page: PageParams,
    ) -> Result<(Vec<DeliveryEvent>, u64), StoreError> {
        let guard = self.inner.read().await;
        let mut items: Vec<DeliveryEvent> = guard
        .deliveries
        .iter()
        .filter(|e| filter.channel_id.map_or(true, |id| e.channel_id == id))
        .filter(|e| filter.status.map_or(true, |s| e.status == s))
        .cloned()
        .collect();
        items.sort_by_key(|e| e.created_at);
        items.reverse();
        Ok(paginate(items, page))
    }

    async fn get_provisioning_task(&self, id: Uuid) -> Result<Option<ProvisioningTask>, StoreError> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn list_provisioning_tasks(&self) -> Result<Vec<ProvisioningTask>, StoreError> {
        Ok(self.inner.read().await.tasks.values().cloned().collect())
    }

    async fn upsert_provisioning_task(&self, task: ProvisioningTask) -> Result<ProvisioningTask, StoreError> {
        let mut guard = self.inner.write().await;
        let conflict = guard.tasks.values().any(|t| {
                t.id != task.id
                && t.target_ap_ssid == task.target_ap_ssid
                && !matches!(t.state, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
        });
        if conflict && !matches!(task.state, TaskState::Completed | TaskState::Failed | TaskState::Cancelled) {
            return Err(StoreError::Conflict(format!(
                        "a non-terminal task already targets {}",
                        task.target_ap_ssid
            )));
        }
        guard.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_provisioning_agent(&self, id: Uuid) -> Result<Option<ProvisioningAgent>, StoreError> {
        Ok(self.inner.read().await.agents.get(&id).cloned())
    }

    async fn list_provisioning_agents(&self) -> Result<Vec<ProvisioningAgent>, StoreError> {
        Ok(self.inner.read().await.agents.values().cloned().collect())
    }

    async fn upsert_provisioning_agent(&self, agent: ProvisioningAgent) -> Result<ProvisioningAgent, StoreError> {
        self.inner.write().await.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.inner.write().await.events.push(event);
        Ok(())
    }

    async fn list_events(&self, limit: u32) -> Result<Vec<AuditEvent>, StoreError> {
        let guard = self.inner.read().await;
        let mut items = guard.events.clone();
        items.sort_by_key(|e| e.at);
        items.reverse();
        items.truncate(limit as usize);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use shellyfleet_domain::{DeviceFamily, DeviceGeneration, DeviceStatus};

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
    async fn upsert_then_get_roundtrips() {
        let store = MemoryStore::new();
        let d = device("AA:BB:CC:DD:EE:01");
        let saved = store.upsert_device(d.clone()).await.unwrap();
        let fetched = store.get_device(saved.id).await.unwrap().unwrap();
        assert_eq!(fetched.mac, d.mac);
        assert_eq!(fetched.rev, 1);
    }

    #[tokio::test]
    async fn duplicate_mac_on_different_id_is_conflict() {
        let store = MemoryStore::new();
        let d1 = store.upsert_device(device("AA:BB:CC:DD:EE:01")).await.unwrap();
        let mut d2 = device("AA:BB:CC:DD:EE:01");
        assert_ne!(d1.id, d2.id);
        let err = store.upsert_device(d2.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        d2.id = d1.id;
        assert!(store.upsert_device(d2).await.is_ok());
    }

    #[tokio::test]
    async fn bulk_upsert_by_mac_merges_existing_id() {
        let store = MemoryStore::new();
        let d1 = store.upsert_device(device("AA:BB:CC:DD:EE:01")).await.unwrap();
        let mut updated = device("AA:BB:CC:DD:EE:01");
        updated.ip = "192.168.1.50".parse().unwrap();
        let out = store.bulk_upsert_devices_by_mac(vec![updated]).await.unwrap();
        assert_eq!(out[0].id, d1.id);
        assert_eq!(out[0].ip.to_string(), "192.168.1.50");
    }

    #[tokio::test]
    async fn pagination_clamps_and_slices() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.upsert_device(device(&format!("AA:BB:CC:DD:EE:{:02}", i))).await.unwrap();
        }
        let (items, total) = store
        .list_devices(&DeviceFilter::default(), PageParams::clamp(Some(1), Some(2)))
        .await
        .unwrap();
        assert_eq!(total, 5);
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn soft_deleted_device_excluded_by_default() {
        let store = MemoryStore::new();
        let d = store.upsert_device(device("AA:BB:CC:DD:EE:01")).await.unwrap();
        store.soft_delete_device(d.id).await.unwrap();
        let (items, _) = store
        .list_devices(&DeviceFilter::default(), PageParams::clamp(None, None))
        .await
        .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn unknown_plugin_filter_returns_empty_not_error() {
        let store = MemoryStore::new();
        let (items, total) = store
        .list_sync_runs(
            &SyncRunFilter { plugin: Some("no-such-plugin".into()),..Default::default() },
            PageParams::clamp(None, None),
        )
        .await
        .unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn second_non_terminal_task_for_same_ssid_is_conflict() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mk = |ssid: &str| ProvisioningTask {
            id: Uuid::new_v4(),
            target_ap_ssid: ssid.into(),
            desired_ssid: "home".into(),
            desired_name: "n".into(),
            assigned_agent: None,
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
            correlation_id: None,
            created_at: now,
            updated_at: now,
        };
        store.upsert_provisioning_task(mk("shelly-ap")).await.unwrap();
        let err = store.upsert_provisioning_task(mk("shelly-ap")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
