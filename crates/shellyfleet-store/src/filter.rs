use shellyfleet_domain::{DeviceStatus, SyncRole};

/// Filter predicate for `list_devices`.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub status: Option<DeviceStatus>,
    pub family_model_contains: Option<String>,
    pub include_deleted: bool,
}

/// Filter predicate for `list_sync_runs` / `list_schedules`. An unknown
/// `plugin` filter yields an empty result with `success: true` at the API
/// layer, never an error.
#[derive(Debug, Clone, Default)]
pub struct SyncRunFilter {
    pub plugin: Option<String>,
    pub role: Option<SyncRole>,
    pub success: Option<bool>,
}

/// Filter predicate for `list_delivery_events`.
#[derive(Debug, Clone, Default)]
pub struct DeliveryEventFilter {
    pub channel_id: Option<uuid::Uuid>,
    pub status: Option<shellyfleet_domain::DeliveryStatus>,
}
