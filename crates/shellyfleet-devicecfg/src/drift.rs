use serde_json::Value;
use shellyfleet_domain::{Device, Severity};

use crate::convert::from_api_config;
use crate::error::DeviceCfgError;
use crate::normalize::{diff, normalize, ChangeSet};

/// Sections whose drift is operationally significant.
const WARNING_SECTIONS: &[&str] = &["wifi", "wifi_sta", "auth", "login", "mqtt"];

#[derive(Debug, Clone)]
pub struct DriftReport {
    pub device_id: uuid::Uuid,
    pub change_set: ChangeSet,
    pub severity: Severity,
}

/// Classifies a change set's severity by whether any changed path touches a
/// section in [`WARNING_SECTIONS`].
pub fn classify_severity(change_set: &ChangeSet) -> Severity {
    let touches_warning_section = change_set.0.iter().any(|c| {
            WARNING_SECTIONS
            .iter()
            .any(|section| c.path.contains(&format!(".{section}.")) || c.path.ends_with(&format!(".{section}")))
    });
    if touches_warning_section {
        Severity::Warning
    } else {
        Severity::Info
    }
}

/// Fetches the device's live configuration via the supplied fetch function,
/// normalizes both sides against the stored desired raw blob, and diffs.
/// Returns `None` when there is no drift.
///
/// `fetch_live` is injected (rather than a concrete [`shellyfleet_client::DeviceClient`])
/// so this stays unit-testable without spinning up an HTTP server; the API
/// layer supplies a closure backed by the real client registry.
pub async fn detect<F, Fut>(
    device: &Device,
    desired_raw: &Value,
    fetch_live: F,
) -> Result<Option<DriftReport>, DeviceCfgError>
where
F: FnOnce() -> Fut,
Fut: std::future::Future<Output = Result<Value, shellyfleet_client::ClientError>>,
{
    let live_raw = fetch_live().await?;
    let live_typed = from_api_config(&live_raw, device);
    let desired_typed = from_api_config(desired_raw, device);

    let live_normalized = normalize(&serde_json::to_value(&live_typed).unwrap_or(Value::Null));
    let desired_normalized = normalize(&serde_json::to_value(&desired_typed).unwrap_or(Value::Null));

    let change_set = diff(&desired_normalized, &live_normalized);
    if change_set.is_empty() {
        return Ok(None);
    }
    let severity = classify_severity(&change_set);
    Ok(Some(DriftReport {
                device_id: device.id,
                change_set,
                severity,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use shellyfleet_domain::{DeviceFamily, DeviceGeneration, DeviceStatus, MacAddress};
    use uuid::Uuid;

    fn device() -> Device {
        Device {
            id: Uuid::new_v4(),
            mac: MacAddress::parse("AA:BB:CC:DD:EE:01").unwrap(),
            ip: "192.168.1.2".parse().unwrap(),
            generation: DeviceGeneration::Gen1,
            family: DeviceFamily::Gen1RelayPM,
            model: "SHSW-PM".to_string(),
            name: "kitchen".to_string(),
            firmware: "x".to_string(),
            status: DeviceStatus::Online,
            last_seen: Utc::now(),
            settings: Value::Null,
            rev: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn identical_configs_produce_no_drift() {
        let device = device();
        let desired = json!({ "wifi_sta": { "ssid": "home" } });
        let live = desired.clone();
        let result = detect(&device, &desired, || async move { Ok(live) }).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn wifi_change_is_warning_severity() {
        let device = device();
        let desired = json!({ "wifi_sta": { "ssid": "home" } });
        let live = json!({ "wifi_sta": { "ssid": "rogue-ap" } });
        let report = detect(&device, &desired, || async move { Ok(live) }).await.unwrap().unwrap();
        assert_eq!(report.severity, Severity::Warning);
        assert!(!report.change_set.is_empty());
    }

    #[tokio::test]
    async fn cosmetic_change_is_info_severity() {
        let device = device();
        let desired = json!({ "name": "kitchen-switch" });
        let live = json!({ "name": "kitchen-switch-renamed" });
        let report = detect(&device, &desired, || async move { Ok(live) }).await.unwrap().unwrap();
        assert_eq!(report.severity, Severity::Info);
    }

    #[tokio::test]
    async fn client_error_propagates() {
        let device = device();
        let desired = json!({});
        let result = detect(&device, &desired, || async move {
                Err(shellyfleet_client::ClientError::Unreachable("no route".into()))
        })
        .await;
        assert!(result.is_err());
    }
}
