use serde_json::Value;
use shellyfleet_domain::DeviceFamily;

/// Classifies a probe response body into a `(family, model)` pair.
/// Gen2+ devices answer `/shelly` with a `gen` marker; Gen1 devices answer
/// `/settings` with a `device.type` model code and no `gen` field.
pub fn classify(body: &Value) -> (DeviceFamily, String) {
    if let Some(gen) = body.get("gen").and_then(Value::as_u64) {
        if gen >= 2 {
            let model = body.get("model").and_then(Value::as_str).unwrap_or("unknown").to_string();
            return (DeviceFamily::Gen2, model);
        }
    }

    let model = body
    .get("device")
    .and_then(|d| d.get("type"))
    .and_then(Value::as_str)
    .or_else(|| body.get("type").and_then(Value::as_str))
    .unwrap_or("unknown")
    .to_string();

    let family = match model.as_str() {
        m if m.starts_with("SHSW-PM") => DeviceFamily::Gen1RelayPM,
        m if m.starts_with("SHSW-21") || m.starts_with("SHSW-25") => DeviceFamily::Gen1RelayDual,
        m if m.starts_with("SHIX3") => DeviceFamily::Gen1Input3,
        m if m.starts_with("SHSW-1") => DeviceFamily::Gen1RelaySingle,
        _ => DeviceFamily::Gen1RelaySingle,
    };
    (family, model)
}

/// Extracts a MAC address from a probe body, trying the common field names
/// used across both generations (`mac`, `device.mac`).
pub fn extract_mac(body: &Value) -> Option<String> {
    body.get("mac")
    .and_then(Value::as_str)
    .or_else(|| body.get("device").and_then(|d| d.get("mac")).and_then(Value::as_str))
    .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_gen2_by_marker() {
        let body = json!({"gen": 2, "model": "SNSW-001X16EU", "mac": "AABBCCDDEE01"});
        let (family, model) = classify(&body);
        assert_eq!(family, DeviceFamily::Gen2);
        assert_eq!(model, "SNSW-001X16EU");
    }

    #[test]
    fn classifies_gen1_relay_pm_by_device_type() {
        let body = json!({"device": {"type": "SHSW-PM", "mac": "AABBCCDDEE02"}});
        let (family, model) = classify(&body);
        assert_eq!(family, DeviceFamily::Gen1RelayPM);
        assert_eq!(model, "SHSW-PM");
    }

    #[test]
    fn extracts_mac_from_either_shape() {
        assert_eq!(extract_mac(&json!({"mac": "AA"})), Some("AA".to_string()));
        assert_eq!(extract_mac(&json!({"device": {"mac": "BB"}})), Some("BB".to_string()));
        assert_eq!(extract_mac(&json!({})), None);
    }
}
