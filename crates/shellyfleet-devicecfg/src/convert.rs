use chrono::Utc;
use serde_json::{Map, Value};
use shellyfleet_domain::{
    AuthConfig, CloudConfig, Device, DeviceConfiguration, DeviceGeneration, InputConfig,
    LocationConfig, MeterConfig, MqttConfig, NetworkConfigSection, RelayConfig, SystemConfig,
    WifiConfig,
};

use crate::normalize::normalize_hash;

/// Wire key used for the auth/login section. Gen1 calls it `login`, Gen2+
/// calls it `auth`; everything else is shared between the two generations in
/// this engine's simplified wire model.
fn auth_key(gen: DeviceGeneration) -> &'static str {
    match gen {
        DeviceGeneration::Gen1 => "login",
        DeviceGeneration::Gen2Plus => "auth",
    }
}

fn wifi_key(gen: DeviceGeneration) -> &'static str {
    match gen {
        DeviceGeneration::Gen1 => "wifi_sta",
        DeviceGeneration::Gen2Plus => "wifi",
    }
}

fn take_obj(obj: &mut Map<String, Value>, key: &str) -> Option<Value> {
    obj.remove(key)
}

fn parse_section<T: serde::de::DeserializeOwned>(v: Value) -> Option<T> {
    serde_json::from_value(v).ok()
}

/// Convert a raw wire blob into the typed model. Unclaimed top-level keys are
/// preserved verbatim in `cfg.raw` (round-trip contract).
pub fn from_api_config(raw: &Value, device: &Device) -> DeviceConfiguration {
    let mut obj = raw.as_object().cloned().unwrap_or_default();
    let gen = device.generation;

    let wifi = take_obj(&mut obj, wifi_key(gen)).and_then(parse_section::<WifiConfig>);
    let mqtt = take_obj(&mut obj, "mqtt").and_then(parse_section::<MqttConfig>);
    let auth = take_obj(&mut obj, auth_key(gen)).and_then(parse_section::<AuthConfig>);
    let network = take_obj(&mut obj, "network").and_then(parse_section::<NetworkConfigSection>);
    let cloud = take_obj(&mut obj, "cloud").and_then(parse_section::<CloudConfig>);
    let location = take_obj(&mut obj, "location").and_then(parse_section::<LocationConfig>);
    let led = take_obj(&mut obj, "led").and_then(parse_section);

    // System is assembled from individual top-level scalars rather than a
    // single nested object — Gen1 has no `system` wire key at all.
    let device_name = take_obj(&mut obj, "name").and_then(|v| v.as_str().map(str::to_string));
    let timezone = take_obj(&mut obj, "timezone").and_then(|v| v.as_str().map(str::to_string));
    let led_status_disable = take_obj(&mut obj, "led_status_disable").and_then(|v| v.as_bool());
    let system = if device_name.is_some() || timezone.is_some() || led_status_disable.is_some() {
        Some(SystemConfig {
                device_name,
                timezone,
                led_status_disable,
        })
    } else {
        None
    };

    let relays = take_obj(&mut obj, "relays")
    .and_then(|v| v.as_array().cloned())
    .map(|arr| {
            arr.into_iter()
            .filter_map(parse_section::<RelayConfig>)
            .collect()
    })
    .unwrap_or_default();

    let meters = take_obj(&mut obj, "meters")
    .and_then(|v| v.as_array().cloned())
    .map(|arr| {
            arr.into_iter()
            .filter_map(parse_section::<MeterConfig>)
            .collect()
    })
    .unwrap_or_default();

    let inputs = take_obj(&mut obj, "inputs")
    .and_then(|v| v.as_array().cloned())
    .map(|arr| {
            arr.into_iter()
            .filter_map(parse_section::<InputConfig>)
            .collect()
    })
    .unwrap_or_default();

    let now = Utc::now();
    let mut cfg = DeviceConfiguration {
        device_id: device.id,
        wifi,
        mqtt,
        auth,
        system,
        network,
        cloud,
        location,
        relays,
        meters,
        inputs,
        led,
        raw: obj,
        desired_hash: String::new(),
        created_at: now,
        updated_at: now,
    };
    cfg.desired_hash = normalize_hash(&cfg);
    cfg
}

fn section_value<T: serde::Serialize>(v: &Option<T>) -> Option<Value> {
    v.as_ref().map(|s| serde_json::to_value(s).expect("section serializes"))
}

/// Convert the typed model back to a raw wire blob. Typed-only defaults
/// (`device_id`, `desired_hash`, timestamps) are never written onto the wire
///.
pub fn to_api_config(cfg: &DeviceConfiguration, device: &Device) -> Value {
    let mut obj = cfg.raw.clone();
    let gen = device.generation;

    if let Some(v) = section_value(&cfg.wifi) {
        obj.insert(wifi_key(gen).to_string(), v);
    }
    if let Some(v) = section_value(&cfg.mqtt) {
        obj.insert("mqtt".to_string(), v);
    }
    if let Some(v) = section_value(&cfg.auth) {
        obj.insert(auth_key(gen).to_string(), v);
    }
    if let Some(v) = section_value(&cfg.network) {
        obj.insert("network".to_string(), v);
    }
    if let Some(v) = section_value(&cfg.cloud) {
        obj.insert("cloud".to_string(), v);
    }
    if let Some(v) = section_value(&cfg.location) {
        obj.insert("location".to_string(), v);
    }
    if let Some(v) = section_value(&cfg.led) {
        obj.insert("led".to_string(), v);
    }

    if let Some(sys) = &cfg.system {
        if let Some(name) = &sys.device_name {
            obj.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(tz) = &sys.timezone {
            obj.insert("timezone".to_string(), Value::String(tz.clone()));
        }
        if let Some(led_disable) = sys.led_status_disable {
            obj.insert("led_status_disable".to_string(), Value::Bool(led_disable));
        }
    }

    if !cfg.relays.is_empty() {
        obj.insert(
            "relays".to_string(),
            Value::Array(cfg.relays.iter().map(|r| serde_json::to_value(r).unwrap()).collect()),
        );
    }
    if !cfg.meters.is_empty() {
        obj.insert(
            "meters".to_string(),
            Value::Array(cfg.meters.iter().map(|m| serde_json::to_value(m).unwrap()).collect()),
        );
    }
    if !cfg.inputs.is_empty() {
        obj.insert(
            "inputs".to_string(),
            Value::Array(cfg.inputs.iter().map(|i| serde_json::to_value(i).unwrap()).collect()),
        );
    }

    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shellyfleet_domain::{DeviceFamily, DeviceStatus, MacAddress};
    use uuid::Uuid;

    fn gen1_device() -> Device {
        Device {
            id: Uuid::new_v4(),
            mac: MacAddress::parse("AA:BB:CC:DD:EE:01").unwrap(),
            ip: "192.168.1.2".parse().unwrap(),
            generation: DeviceGeneration::Gen1,
            family: DeviceFamily::Gen1RelayPM,
            model: "SHSW-PM".to_string(),
            name: "kitchen".to_string(),
            firmware: "20230913".to_string(),
            status: DeviceStatus::Online,
            last_seen: Utc::now(),
            settings: Value::Null,
            rev: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn round_trip_preserves_relay_auto_on() {
        let device = gen1_device();
        let raw = json!({
                "name": "kitchen-switch",
                "relays": [
                    { "name": "relay0", "ison": false, "default_state": "off", "auto_on": 120.0, "auto_off": 0.0, "schedule": true }
                ],
                "wifi_sta": { "ssid": "home-net", "ipv4_method": "dhcp" },
                "unclaimed_vendor_field": "keep-me",
        });

        let typed = from_api_config(&raw, &device);
        assert_eq!(typed.relays.len(), 1);
        assert_eq!(typed.relays[0].auto_on, Some(120.0));

        let back = to_api_config(&typed, &device);
        assert_eq!(back["unclaimed_vendor_field"], "keep-me");
        assert_eq!(back["relays"][0]["auto_on"], 120.0);
        assert_eq!(back["relays"][0]["schedule"], true);
        assert_eq!(back["wifi_sta"]["ssid"], "home-net");
    }

    #[test]
    fn typed_only_defaults_never_synthesized_on_export() {
        let device = gen1_device();
        let raw = json!({ "name": "n" });
        let typed = from_api_config(&raw, &device);
        let back = to_api_config(&typed, &device);
        assert!(back.get("device_id").is_none());
        assert!(back.get("desired_hash").is_none());
    }

    #[test]
    fn empty_settings_body_normalizes_to_empty_object() {
        let device = gen1_device();
        let typed = from_api_config(&Value::Null, &device);
        let back = to_api_config(&typed, &device);
        assert_eq!(back, json!({}));
    }
}
