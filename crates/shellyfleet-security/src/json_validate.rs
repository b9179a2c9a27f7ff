use serde_json::Value;

use crate::config::SecurityConfig;
use crate::error::SecurityError;

/// Query-param keys rejected regardless of configuration — prototype
/// pollution vectors that have no legitimate use in this API.
const FORBIDDEN_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Stage 4: recursively bounds JSON body depth and array length, and
/// rejects forbidden object keys anywhere in the document.
pub fn validate_json(value: &Value, config: &SecurityConfig) -> Result<(), SecurityError> {
    validate_depth(value, config.max_json_depth, config.max_json_array_len)
}

fn validate_depth(value: &Value, remaining_depth: usize, max_array_len: usize) -> Result<(), SecurityError> {
    match value {
        Value::Array(items) => {
            if remaining_depth == 0 {
                return Err(SecurityError::JsonTooDeep);
            }
            if items.len() > max_array_len {
                return Err(SecurityError::JsonArrayTooLong);
            }
            for item in items {
                validate_depth(item, remaining_depth - 1, max_array_len)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            if remaining_depth == 0 {
                return Err(SecurityError::JsonTooDeep);
            }
            for (key, v) in map {
                if FORBIDDEN_KEYS.contains(&key.as_str()) {
                    return Err(SecurityError::ForbiddenKey(key.clone()));
                }
                validate_depth(v, remaining_depth - 1, max_array_len)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Validates query-param keys against the same forbidden-key list, for
/// requests where attacker-controlled structure arrives via the query
/// string rather than a JSON body.
pub fn validate_query_keys(pairs: &[(String, String)]) -> Result<(), SecurityError> {
    for (key, _) in pairs {
        if FORBIDDEN_KEYS.contains(&key.as_str()) {
            return Err(SecurityError::ForbiddenKey(key.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_deeply_nested_object() {
        let config = SecurityConfig { max_json_depth: 2,..SecurityConfig::default() };
        let value = json!({"a": {"b": {"c": 1}}});
        assert!(matches!(validate_json(&value, &config), Err(SecurityError::JsonTooDeep)));
    }

    #[test]
    fn rejects_oversized_array() {
        let config = SecurityConfig { max_json_array_len: 3,..SecurityConfig::default() };
        let value = json!([1, 2, 3, 4]);
        assert!(matches!(validate_json(&value, &config), Err(SecurityError::JsonArrayTooLong)));
    }

    #[test]
    fn rejects_proto_pollution_key() {
        let config = SecurityConfig::default();
        let value = json!({"__proto__": {"polluted": true}});
        assert!(matches!(validate_json(&value, &config), Err(SecurityError::ForbiddenKey(_))));
    }

    #[test]
    fn accepts_normal_payload() {
        let config = SecurityConfig::default();
        let value = json!({"name": "shelly-plug", "tags": ["kitchen", "plug"]});
        assert!(validate_json(&value, &config).is_ok());
    }
}
