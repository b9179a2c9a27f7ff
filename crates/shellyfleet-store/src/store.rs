use async_trait::async_trait;
use shellyfleet_domain::{
    AuditEvent, DeliveryEvent, Device, DeviceConfiguration, DiscoveredDevice, MacAddress,
    NotificationChannel, NotificationRule, PageParams, ProvisioningAgent, ProvisioningTask,
    Schedule, SyncRun, Template,
};
use uuid::Uuid;

use crate::error::StoreError;
use crate::filter::{DeliveryEventFilter, DeviceFilter, SyncRunFilter};

/// Abstract persistence boundary. One trait, three implementations —
/// [`crate::memory::MemoryStore`], [`crate::redb_store::RedbStore`], and
/// [`crate::postgres_store::PostgresStore`] — so every handler and every
/// business-logic crate depends only on `Arc<dyn Storage>`.
///
/// Every list operation returns `(items, total)` so the API layer can build a
/// [`shellyfleet_domain::Pagination`] block without a second round-trip.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    // ── Devices ──────────────────────────────────────────────────────────
    async fn get_device(&self, id: Uuid) -> Result<Option<Device>, StoreError>;
    async fn get_device_by_mac(&self, mac: &MacAddress) -> Result<Option<Device>, StoreError>;
    async fn list_devices(
        &self,
        filter: &DeviceFilter,
        page: PageParams,
    ) -> Result<(Vec<Device>, u64), StoreError>;
    /// Insert or update by `id`. Returns `Conflict` if `mac` collides with a
    /// different device id.
    async fn upsert_device(&self, device: Device) -> Result<Device, StoreError>;
    /// Bulk upsert keyed by MAC, used by discovery promotion.
    async fn bulk_upsert_devices_by_mac(&self, devices: Vec<Device>) -> Result<Vec<Device>, StoreError>;
    async fn soft_delete_device(&self, id: Uuid) -> Result<(), StoreError>;

    // ── Discovered devices ───────────────────────────────────────────────
    async fn upsert_discovered_device(&self, device: DiscoveredDevice) -> Result<(), StoreError>;
    async fn list_discovered_devices(&self) -> Result<Vec<DiscoveredDevice>, StoreError>;
    /// Deletes rows whose `expires_at` has passed. Returns the number purged.
    async fn purge_expired_discovered_devices(&self) -> Result<u64, StoreError>;

    // ── Device configuration ─────────────────────────────────────────────
    async fn get_device_configuration(&self, device_id: Uuid) -> Result<Option<DeviceConfiguration>, StoreError>;
    async fn upsert_device_configuration(&self, cfg: DeviceConfiguration) -> Result<DeviceConfiguration, StoreError>;

    // ── Templates ────────────────────────────────────────────────────────
    async fn get_template(&self, id: Uuid) -> Result<Option<Template>, StoreError>;
    async fn get_template_by_name(&self, name: &str) -> Result<Option<Template>, StoreError>;
    async fn list_templates(&self) -> Result<Vec<Template>, StoreError>;
    async fn upsert_template(&self, template: Template) -> Result<Template, StoreError>;
    async fn delete_template(&self, id: Uuid) -> Result<(), StoreError>;

    // ── Sync runs & schedules ────────────────────────────────────────────
    async fn insert_sync_run(&self, run: SyncRun) -> Result<SyncRun, StoreError>;
    async fn update_sync_run(&self, run: SyncRun) -> Result<SyncRun, StoreError>;
    async fn list_sync_runs(
        &self,
        filter: &SyncRunFilter,
        page: PageParams,
    ) -> Result<(Vec<SyncRun>, u64), StoreError>;

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, StoreError>;
    async fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError>;
    async fn upsert_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError>;
    async fn delete_schedule(&self, id: Uuid) -> Result<(), StoreError>;

    // ── Notifications ────────────────────────────────────────────────────
    async fn list_notification_channels(&self) -> Result<Vec<NotificationChannel>, StoreError>;
    async fn get_notification_channel(&self, id: Uuid) -> Result<Option<NotificationChannel>, StoreError>;
    async fn upsert_notification_channel(&self, channel: NotificationChannel) -> Result<NotificationChannel, StoreError>;

    async fn list_notification_rules(&self) -> Result<Vec<NotificationRule>, StoreError>;
    async fn upsert_notification_rule(&self, rule: NotificationRule) -> Result<NotificationRule, StoreError>;

    async fn record_delivery_event(&self, event: DeliveryEvent) -> Result<DeliveryEvent, StoreError>;
    async fn list_delivery_events(
        &self,
        filter: &DeliveryEventFilter,
        page: PageParams,
    ) -> Result<(Vec<DeliveryEvent>, u64), StoreError>;

    // ── Provisioning ─────────────────────────────────────────────────────
    async fn get_provisioning_task(&self, id: Uuid) -> Result<Option<ProvisioningTask>, StoreError>;
    async fn list_provisioning_tasks(&self) -> Result<Vec<ProvisioningTask>, StoreError>;
    /// `Conflict` if another non-terminal task already targets the same
    /// `target_ap_ssid`.
    async fn upsert_provisioning_task(&self, task: ProvisioningTask) -> Result<ProvisioningTask, StoreError>;

    async fn get_provisioning_agent(&self, id: Uuid) -> Result<Option<ProvisioningAgent>, StoreError>;
    async fn list_provisioning_agents(&self) -> Result<Vec<ProvisioningAgent>, StoreError>;
    async fn upsert_provisioning_agent(&self, agent: ProvisioningAgent) -> Result<ProvisioningAgent, StoreError>;

    // ── Audit trail ──────────────────────────────────────────────────────
    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError>;
    async fn list_events(&self, limit: u32) -> Result<Vec<AuditEvent>, StoreError>;

    /// Used by `GET /readyz`. A cheap read is enough to prove the backend
    /// answers.
    async fn ready(&self) -> Result<(), StoreError> {
        self.list_devices(&DeviceFilter::default(), PageParams::clamp(Some(1), Some(1)))
        .await
        .map(|_| ())
    }
}
