use std::collections::HashMap;
use std::time::Duration;

/// Tunables for the middleware chain, all with the spec's stated
/// defaults. Path overrides only ever tighten the global rate limit —
/// never loosen it.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub max_header_count: usize,
    pub max_header_size_bytes: usize,
    pub forbidden_headers: Vec<String>,
    pub allowed_content_types: Vec<String>,
    pub max_body_bytes: usize,
    pub max_json_depth: usize,
    pub max_json_array_len: usize,
    pub rate_limit: RateLimitConfig,
    pub attacker: AttackerConfig,
    pub alert_channel_capacity: usize,
    pub use_proxy_headers: bool,
    pub trusted_proxies: Vec<ipnetwork::IpNetwork>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub global_limit: u32,
    /// Per-path-prefix overrides. Only applied when `limit < global_limit`.
    pub path_overrides: HashMap<String, u32>,
}

#[derive(Debug, Clone)]
pub struct AttackerConfig {
    pub block_duration: Duration,
    pub suspicious_threshold: u64,
    pub rate_violation_threshold: u64,
    pub distinct_attack_type_threshold: usize,
    pub suspicious_rate_per_hour: f64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            max_header_count: 50,
            max_header_size_bytes: 8 * 1024,
            forbidden_headers: vec!["x-forwarded-proto".to_string()],
            allowed_content_types: vec![
                "application/json".to_string(),
                "application/x-www-form-urlencoded".to_string(),
                "multipart/form-data".to_string(),
                "text/plain".to_string(),
            ],
            max_body_bytes: 10 * 1024 * 1024,
            max_json_depth: 10,
            max_json_array_len: 1000,
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(1),
                global_limit: 20,
                path_overrides: HashMap::new(),
            },
            attacker: AttackerConfig {
                block_duration: Duration::from_secs(3600),
                suspicious_threshold: 10,
                rate_violation_threshold: 5,
                distinct_attack_type_threshold: 3,
                suspicious_rate_per_hour: 5.0,
            },
            alert_channel_capacity: 100,
            use_proxy_headers: false,
            trusted_proxies: Vec::new(),
        }
    }
}

impl RateLimitConfig {
    /// The effective limit for `path`: the stricter of the global default
    /// and any matching prefix override.
    pub fn limit_for_path(&self, path: &str) -> u32 {
        let mut limit = self.global_limit;
        for (prefix, override_limit) in &self.path_overrides {
            if path.starts_with(prefix.as_str()) && *override_limit < limit {
                limit = *override_limit;
            }
        }
        limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_override_only_applies_when_stricter() {
        let mut cfg = RateLimitConfig { window: Duration::from_secs(1), global_limit: 20, path_overrides: HashMap::new() };
        cfg.path_overrides.insert("/api/v1/devices".to_string(), 5);
        cfg.path_overrides.insert("/api/v1/loose".to_string(), 100);
        assert_eq!(cfg.limit_for_path("/api/v1/devices"), 5);
        assert_eq!(cfg.limit_for_path("/api/v1/loose"), 20);
        assert_eq!(cfg.limit_for_path("/api/v1/other"), 20);
    }
}
