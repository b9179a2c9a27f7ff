use std::collections::HashMap;
use std::sync::RwLock;

use base64::Engine as _;
use serde_json::Value;
use shellyfleet_domain::{Device, Template};

use crate::error::DeviceCfgError;

/// The whitelisted function set. Anything not in this set
/// fails `validate_template` at save time — never at render time, so an
/// already-saved template can never become unsafe later.
const ALLOWED_FUNCTIONS: &[&str] = &[
    "upper", "lower", "trim", "replace", "slice", "base64", "hex", "urlencode", "if", "default",
    "add", "sub", "mul", "div", "var", "env_safe",
];

/// Scans for `{{... }}` blocks and, within them, call-shaped tokens
/// (`ident(`). Anything call-shaped whose name isn't whitelisted fails
/// template creation with `TemplateUnsafe` — this is the only gate; there is
/// no separate runtime check because render can never reach an unlisted
/// function in a template that passed this scan.
pub fn validate_template(body: &str) -> Result<(), DeviceCfgError> {
    for block in iter_blocks(body) {
        validate_expr(block.trim())?;
    }
    Ok(())
}

fn validate_expr(expr: &str) -> Result<(), DeviceCfgError> {
    let expr = expr.trim();
    if expr.starts_with('"') {
        return Ok(());
    }
    if let Some(paren) = expr.find('(') {
        if expr.ends_with(')') {
            let name = expr[..paren].trim();
            if !ALLOWED_FUNCTIONS.contains(&name) {
                return Err(DeviceCfgError::TemplateUnsafe(name.to_string()));
            }
            let inner = &expr[paren + 1..expr.len() - 1];
            for arg in split_args(inner) {
                validate_expr(&arg)?;
            }
        }
    }
    Ok(())
}

fn iter_blocks(body: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        if let Some(end) = after.find("}}") {
            out.push(&after[..end]);
            rest = &after[end + 2..];
        } else {
            break;
        }
    }
    out
}

/// Split a comma-separated argument list, respecting nested parens and
/// double-quoted strings so `replace(var, ",", ";")` splits into 3 args.
fn split_args(s: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut cur = String::new();
    for c in s.chars() {
        match c {
            '"' => {
                in_quote = !in_quote;
                cur.push(c);
            }
            '(' if !in_quote => {
                depth += 1;
                cur.push(c);
            }
            ')' if !in_quote => {
                depth -= 1;
                cur.push(c);
            }
            ',' if !in_quote && depth == 0 => {
                args.push(std::mem::take(&mut cur));
            }
            _ => cur.push(c),
        }
    }
    if !cur.trim().is_empty() || !args.is_empty() {
        args.push(cur);
    }
    args.into_iter().map(|a| a.trim().to_string()).filter(|a| !a.is_empty()).collect()
}

fn eval_expr(
    expr: &str,
    vars: &HashMap<String, String>,
    device: &Device,
    env_allowlist: &HashMap<String, String>,
) -> Result<String, DeviceCfgError> {
    let expr = expr.trim();

    if let Some(lit) = expr.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(lit.to_string());
    }

    if let Some(paren) = expr.find('(') {
        if expr.ends_with(')') {
            let name = expr[..paren].trim();
            if !ALLOWED_FUNCTIONS.contains(&name) {
                return Err(DeviceCfgError::TemplateUnsafe(name.to_string()));
            }
            let inner = &expr[paren + 1..expr.len() - 1];
            let args: Vec<String> = split_args(inner)
                .iter()
                .map(|a| eval_expr(a, vars, device, env_allowlist))
                .collect::<Result<_, _>>()?;
            return call_fn(name, &args);
        }
    }

    match expr {
        "device.mac" => return Ok(device.mac.to_string()),
        "device.name" => return Ok(device.name.clone()),
        "device.ip" => return Ok(device.ip.to_string()),
        "device.model" => return Ok(device.model.clone()),
        _ => {}
    }

    vars.get(expr)
        .cloned()
        .or_else(|| env_allowlist.get(expr).cloned())
        .ok_or_else(|| DeviceCfgError::UnknownVariable(expr.to_string()))
}

fn call_fn(name: &str, args: &[String]) -> Result<String, DeviceCfgError> {
    let arg = |i: usize| -> Result<&String, DeviceCfgError> {
        args.get(i).ok_or_else(|| DeviceCfgError::RenderError(format!("{name}: missing arg {i}")))
    };
    match name {
        "upper" => Ok(arg(0)?.to_uppercase()),
        "lower" => Ok(arg(0)?.to_lowercase()),
        "trim" => Ok(arg(0)?.trim().to_string()),
        "replace" => Ok(arg(0)?.replace(arg(1)?.as_str(), arg(2)?.as_str())),
        "slice" => {
            let s = arg(0)?;
            let start: usize = arg(1)?.parse().map_err(|_| DeviceCfgError::NotNumeric("slice".into()))?;
            let end: usize = arg(2)?.parse().map_err(|_| DeviceCfgError::NotNumeric("slice".into()))?;
            Ok(s.chars().skip(start).take(end.saturating_sub(start)).collect())
        }
        "base64" => Ok(base64::engine::general_purpose::STANDARD.encode(arg(0)?.as_bytes())),
        "hex" => Ok(arg(0)?.as_bytes().iter().map(|b| format!("{b:02x}")).collect()),
        "urlencode" => Ok(urlencode(arg(0)?)),
        "if" => {
            let cond = arg(0)?;
            if cond == "true" || cond == "1" {
                Ok(arg(1)?.clone())
            } else {
                Ok(args.get(2).cloned().unwrap_or_default())
            }
        }
        "default" => {
            let v = arg(0)?;
            if v.is_empty() {
                Ok(arg(1)?.clone())
            } else {
                Ok(v.clone())
            }
        }
        "add" | "sub" | "mul" | "div" => {
            let a: f64 = arg(0)?.parse().map_err(|_| DeviceCfgError::NotNumeric(name.into()))?;
            let b: f64 = arg(1)?.parse().map_err(|_| DeviceCfgError::NotNumeric(name.into()))?;
            let result = match name {
                "add" => a + b,
                "sub" => a - b,
                "mul" => a * b,
                "div" => {
                    if b == 0.0 {
                        return Err(DeviceCfgError::RenderError("division by zero".into()));
                    }
                    a / b
                }
                _ => unreachable!(),
            };
            Ok(format_number(result))
        }
        "var" | "env_safe" => Ok(arg(0)?.clone()),
        other => Err(DeviceCfgError::TemplateUnsafe(other.to_string())),
    }
}

fn format_number(f: f64) -> String {
    if f.fract() == 0.0 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::new();
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Render `tmpl.body` against `vars`, substituting `{{... }}` blocks.
/// `env_allowlist` is the only source `env_safe` may read from — never the
/// real process environment.
pub fn render_template(
    tmpl: &Template,
    vars: &HashMap<String, String>,
    device: &Device,
    env_allowlist: &HashMap<String, String>,
) -> Result<Value, DeviceCfgError> {
    let mut out = String::new();
    let mut rest = tmpl.body.as_str();
    loop {
        match rest.find("{{") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after = &rest[start + 2..];
                let end = after
                    .find("}}")
                    .ok_or_else(|| DeviceCfgError::RenderError("unterminated {{ block".to_string()))?;
                let expr = &after[..end];
                out.push_str(&eval_expr(expr, vars, device, env_allowlist)?);
                rest = &after[end + 2..];
            }
        }
    }

    match serde_json::from_str::<Value>(&out) {
        Ok(v) => Ok(v),
        Err(_) => Ok(Value::String(out)),
    }
}

#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub template: Template,
}

/// Read-mostly cache keyed by `(name, version)`, copy-on-write invalidated on
/// save.
#[derive(Default)]
pub struct TemplateCache {
    inner: RwLock<HashMap<(String, u32), CompiledTemplate>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str, version: u32) -> Option<CompiledTemplate> {
        self.inner.read().unwrap().get(&(name.to_string(), version)).cloned()
    }

    /// Validate and insert. Whole-cache read lock is dropped before the
    /// write; this is a copy-on-write replace, not an in-place mutation.
    pub fn put(&self, tmpl: Template) -> Result<(), DeviceCfgError> {
        validate_template(&tmpl.body)?;
        let key = (tmpl.name.clone(), tmpl.version);
        self.inner.write().unwrap().insert(key, CompiledTemplate { template: tmpl });
        Ok(())
    }

    pub fn invalidate(&self, name: &str, version: u32) {
        self.inner.write().unwrap().remove(&(name.to_string(), version));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use shellyfleet_domain::{DeviceFamily, DeviceGeneration, DeviceStatus, MacAddress, TemplateScope};
    use uuid::Uuid;

    fn device() -> Device {
        Device {
            id: Uuid::new_v4(),
            mac: MacAddress::parse("AA:BB:CC:DD:EE:01").unwrap(),
            ip: "192.168.1.2".parse().unwrap(),
            generation: DeviceGeneration::Gen1,
            family: DeviceFamily::Gen1RelaySingle,
            model: "SHSW-1".to_string(),
            name: "hallway".to_string(),
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

    fn tmpl(body: &str) -> Template {
        Template {
            id: Uuid::new_v4(),
            name: "t".to_string(),
            scope: TemplateScope::Global,
            body: body.to_string(),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_unsafe_function_at_validation_time() {
        let err = validate_template(r#"{{ exec("rm -rf /") }}"#).unwrap_err();
        assert!(matches!(err, DeviceCfgError::TemplateUnsafe(_)));
    }

    #[test]
    fn accepts_whitelisted_functions() {
        assert!(validate_template(r#"{{ upper(device.name) }}"#).is_ok());
        assert!(validate_template(r#"{{ add("1", "2") }}"#).is_ok());
    }

    #[test]
    fn renders_simple_substitution() {
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), "hello".to_string());
        let v = render_template(&tmpl("name: {{ upper(x) }}"), &vars, &device(), &HashMap::new()).unwrap();
        assert_eq!(v, json!("name: HELLO"));
    }

    #[test]
    fn renders_device_field_lookup() {
        let v = render_template(&tmpl("{{ device.name }}"), &HashMap::new(), &device(), &HashMap::new()).unwrap();
        assert_eq!(v, json!("hallway"));
    }

    #[test]
    fn empty_variable_bag_succeeds_for_global_scope_with_no_vars_used() {
        let v = render_template(&tmpl("static text"), &HashMap::new(), &device(), &HashMap::new()).unwrap();
        assert_eq!(v, json!("static text"));
    }

    #[test]
    fn env_safe_only_reads_caller_allowlist() {
        let mut allow = HashMap::new();
        allow.insert("region".to_string(), "eu".to_string());
        let v = render_template(&tmpl("{{ env_safe(region) }}"), &HashMap::new(), &device(), &allow).unwrap();
        assert_eq!(v, json!("eu"));
    }

    #[test]
    fn arithmetic_add_two_numbers() {
        let v = render_template(&tmpl(r#"{{ add("100", "20") }}"#), &HashMap::new(), &device(), &HashMap::new()).unwrap();
        assert_eq!(v, json!("120"));
    }

    #[test]
    fn cache_put_rejects_unsafe_body_before_storing() {
        let cache = TemplateCache::new();
        let bad = tmpl(r#"{{ exec("whoami") }}"#);
        assert!(cache.put(bad).is_err());
        assert!(cache.get("t", 1).is_none());
    }
}
