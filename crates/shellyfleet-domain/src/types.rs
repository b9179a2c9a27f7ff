use std::collections::HashMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Canonical MAC address: 12 uppercase hex digits, no separators.
/// Accepts `:`/`-` separated input and normalizes on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let cleaned: String = raw
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect::<String>()
        .to_uppercase();
        if cleaned.len() != 12 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid MAC address: {raw}"));
        }
        Ok(MacAddress(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Colon-separated display form, e.g. `AA:BB:CC:DD:EE:01`.
    pub fn display_colon(&self) -> String {
        self.0
        .as_bytes()
        .chunks(2)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join(":")
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_colon())
    }
}

impl TryFrom<String> for MacAddress {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        MacAddress::parse(&s)
    }
}

impl From<MacAddress> for String {
    fn from(m: MacAddress) -> String {
        m.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceGeneration {
    Gen1,
    Gen2Plus,
}

impl std::fmt::Display for DeviceGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceGeneration::Gen1 => write!(f, "1"),
            DeviceGeneration::Gen2Plus => write!(f, "2+"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unreachable,
    Provisioning,
}

/// Device family, modeled as data rather than a type hierarchy.
/// Generation-2+ families are discovered at runtime by the `gen` marker on the
/// wire and collapse to a single `Gen2` variant; Gen1 is split by relay shape
/// because the wire schema differs per shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    Gen1RelaySingle,
    Gen1RelayPM,
    Gen1RelayDual,
    Gen1Input3,
    Gen2,
}

/// Capability set derived from family + model string. Consulted anywhere the
/// engine needs to know "does this device have a thing" without branching on
/// family directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_relay: bool,
    pub has_meter: bool,
    pub has_led: bool,
    pub input_count: u8,
}

impl DeviceFamily {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            DeviceFamily::Gen1RelaySingle => Capabilities {
                has_relay: true,
                has_meter: false,
                has_led: false,
                input_count: 1,
            },
            DeviceFamily::Gen1RelayPM => Capabilities {
                has_relay: true,
                has_meter: true,
                has_led: false,
                input_count: 1,
            },
            DeviceFamily::Gen1RelayDual => Capabilities {
                has_relay: true,
                has_meter: false,
                has_led: false,
                input_count: 2,
            },
            DeviceFamily::Gen1Input3 => Capabilities {
                has_relay: false,
                has_meter: false,
                has_led: false,
                input_count: 3,
            },
            DeviceFamily::Gen2 => Capabilities {
                has_relay: true,
                has_meter: true,
                has_led: true,
                input_count: 2,
            },
        }
    }
}

// ── Device ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub mac: MacAddress,
    pub ip: Ipv4Addr,
    pub generation: DeviceGeneration,
    pub family: DeviceFamily,
    pub model: String,
    pub name: String,
    pub firmware: String,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
    /// Raw JSON settings blob as last fetched/pushed. Authoritative for round-trip.
    pub settings: Value,
    /// Bumped on every successful write; used for last-writer-wins at the row level.
    pub rev: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Http,
    Mdns,
    Ssdp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub mac: MacAddress,
    pub ip: Ipv4Addr,
    pub ap_ssid: Option<String>,
    pub source: DiscoverySource,
    pub first_seen: DateTime<Utc>,
    /// Row is purged once `Utc::now() >= expires_at` (24h TTL from `first_seen`).
    pub expires_at: DateTime<Utc>,
}

// ── Device configuration ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: Option<String>,
    pub password: Option<String>,
    pub ipv4_method: Option<String>,
    pub ip: Option<String>,
    pub gw: Option<String>,
    pub mask: Option<String>,
    #[serde(default, flatten)]
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub enable: bool,
    pub server: Option<String>,
    pub user: Option<String>,
    pub id: Option<String>,
    #[serde(default, flatten)]
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub enable: bool,
    pub username: Option<String>,
    #[serde(default, flatten)]
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub device_name: Option<String>,
    pub timezone: Option<String>,
    pub led_status_disable: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfigSection {
    pub hostname: Option<String>,
    #[serde(default, flatten)]
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    pub enabled: bool,
    pub server: Option<String>,
    #[serde(default, flatten)]
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub tz_autodetect: Option<bool>,
    #[serde(default, flatten)]
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub name: Option<String>,
    pub ison: Option<bool>,
    pub default_state: Option<String>,
    pub auto_on: Option<f64>,
    pub auto_off: Option<f64>,
    /// Keys not claimed by the typed fields above, preserved verbatim.
    #[serde(default, flatten)]
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterConfig {
    pub power: Option<f64>,
    pub is_valid: Option<bool>,
    #[serde(default, flatten)]
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    pub name: Option<String>,
    pub btn_type: Option<String>,
    #[serde(default, flatten)]
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedConfig {
    pub mode: Option<String>,
    pub brightness: Option<u8>,
}

/// Typed device configuration. `raw` is the preserve-bag for every key not
/// claimed by a section above; round-tripping through `to_api_config` must
/// reproduce `raw` plus the typed sections with no loss.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    pub device_id: Uuid,
    pub wifi: Option<WifiConfig>,
    pub mqtt: Option<MqttConfig>,
    pub auth: Option<AuthConfig>,
    pub system: Option<SystemConfig>,
    pub network: Option<NetworkConfigSection>,
    pub cloud: Option<CloudConfig>,
    pub location: Option<LocationConfig>,
    #[serde(default)]
    pub relays: Vec<RelayConfig>,
    #[serde(default)]
    pub meters: Vec<MeterConfig>,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    pub led: Option<LedConfig>,
    /// Fields not claimed by any typed section, preserved verbatim.
    #[serde(default)]
    pub raw: Map<String, Value>,
    /// SHA-256 of the normalized JSON form; lets drift detection and
    /// idempotent re-apply skip unchanged devices cheaply.
    pub desired_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Templates ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateScope {
    Global,
    Model { model: String },
    Generation { generation: DeviceGeneration },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub scope: TemplateScope,
    pub body: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Sync plugins ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRole {
    Export,
    Import,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginCapabilities {
    pub incremental: bool,
    pub scheduling: bool,
    pub auth: bool,
    pub max_size_bytes: Option<u64>,
    pub concurrency: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub role: SyncRole,
    pub formats: Vec<String>,
    pub schema: Value,
    pub capabilities: PluginCapabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSummary {
    pub records: u64,
    pub bytes: u64,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub plugin: String,
    pub role: SyncRole,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub summary: Option<SyncSummary>,
    pub output_path: Option<String>,
    pub error: Option<String>,
}

impl SyncRun {
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub plugin: String,
    pub interval_sec: u64,
    pub enabled: bool,
    pub request: Value,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

// ── Notifications ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Email,
    Webhook,
    Chat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Uuid,
    pub name: String,
    pub channel_type: ChannelType,
    /// Opaque driver config (SMTP server, webhook URL, …).
    pub config: Value,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: Uuid,
    pub name: String,
    pub channel_id: Uuid,
    pub event_types: Vec<String>,
    pub min_severity: Severity,
    pub min_interval_min: u32,
    pub max_per_hour: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failed,
    RateLimited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub rule_id: Option<Uuid>,
    pub status: DeliveryStatus,
    pub attempt: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Provisioning ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningTask {
    pub id: Uuid,
    pub target_ap_ssid: String,
    pub desired_ssid: String,
    pub desired_name: String,
    pub assigned_agent: Option<Uuid>,
    pub state: TaskState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Busy,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningAgent {
    pub id: Uuid,
    pub hostname: String,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub last_heartbeat: DateTime<Utc>,
}

// ── Security ─────────────────────────────────────────────────────────────────

/// Per-client-IP bookkeeping used by the security pipeline. In-memory only;
/// never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttackerRecord {
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub suspicious_count: u64,
    pub rate_limit_violations: u64,
    pub attack_types: HashMap<String, u64>,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl AttackerRecord {
    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    pub fn distinct_attack_types(&self) -> usize {
        self.attack_types.len()
    }
}

// ── Audit trail ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditKind {
    DiscoveryPromoted { mac: String },
    ConfigPushed { device_id: Uuid },
    DriftDetected { device_id: Uuid, severity: Severity },
    ProvisioningTransition { task_id: Uuid, from: TaskState, to: TaskState },
    SyncRunCompleted { run_id: Uuid, success: bool },
    NotificationDelivered { channel_id: Uuid, status: DeliveryStatus },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub kind: AuditKind,
}

impl AuditEvent {
    pub fn new(kind: AuditKind) -> Self {
        AuditEvent { id: Uuid::new_v4(), at: Utc::now(), kind }
    }
}

// ── Pagination & envelope ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: u32,
    pub page_size: u32,
}

impl PageParams {
    pub const DEFAULT_PAGE: u32 = 1;
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// `page<1 → 1`; `page_size` outside `[1,100] → 20` (the default).
    /// Non-integer inputs are the caller's responsibility to have already
    /// defaulted before construction (the API layer does this at the
    /// query-string extraction boundary).
    pub fn clamp(page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = match page {
            Some(p) if p >= 1 => p,
            _ => Self::DEFAULT_PAGE,
        };
        let page_size = match page_size {
            Some(s) if (1..=Self::MAX_PAGE_SIZE).contains(&s) => s,
            _ => Self::DEFAULT_PAGE_SIZE,
        };
        PageParams { page, page_size }
    }

    pub fn offset(&self) -> u64 {
        ((self.page - 1) as u64) * (self.page_size as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(params: PageParams, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + params.page_size as u64 - 1) / params.page_size as u64
        };
        Pagination {
            page: params.page,
            page_size: params.page_size,
            total,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_normalizes_separators_and_case() {
        let a = MacAddress::parse("aa:bb:cc:dd:ee:01").unwrap();
        let b = MacAddress::parse("AA-BB-CC-DD-EE-01").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "AABBCCDDEE01");
        assert_eq!(a.display_colon(), "AA:BB:CC:DD:EE:01");
    }

    #[test]
    fn mac_address_rejects_wrong_length() {
        assert!(MacAddress::parse("AA:BB:CC").is_err());
    }

    #[test]
    fn page_params_clamp_zero_page_to_one() {
        let p = PageParams::clamp(Some(0), Some(20));
        assert_eq!(p.page, 1);
    }

    #[test]
    fn page_params_clamp_oversized_page_size_to_default() {
        let p = PageParams::clamp(Some(1), Some(500));
        assert_eq!(p.page_size, PageParams::DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn page_params_clamp_missing_to_defaults() {
        let p = PageParams::clamp(None, None);
        assert_eq!(p.page, PageParams::DEFAULT_PAGE);
        assert_eq!(p.page_size, PageParams::DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn pagination_total_pages_rounds_up() {
        let p = Pagination::new(PageParams::clamp(Some(1), Some(20)), 41);
        assert_eq!(p.total_pages, 3);
    }

    #[test]
    fn attacker_record_block_expiry() {
        let now = Utc::now();
        let rec = AttackerRecord {
            blocked_until: Some(now + chrono::Duration::seconds(5)),
            ..Default::default()
        };
        assert!(rec.is_blocked(now));
        assert!(!rec.is_blocked(now + chrono::Duration::seconds(10)));
    }
}
