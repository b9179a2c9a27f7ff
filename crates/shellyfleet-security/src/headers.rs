use axum::http::HeaderMap;

use crate::config::SecurityConfig;
use crate::error::SecurityError;

/// Stage 1: header count, individual size, and forbidden headers.
/// `X-Forwarded-Proto` (and anything else in `forbidden_headers`) is only
/// forbidden when proxy trust is not configured — an operator who enables
/// `use_proxy_headers` is explicitly opting into trusting it.
pub fn validate_headers(headers: &HeaderMap, config: &SecurityConfig) -> Result<(), SecurityError> {
    if headers.len() > config.max_header_count {
        return Err(SecurityError::TooManyHeaders(headers.len()));
    }
    for (name, value) in headers.iter() {
        if value.len() > config.max_header_size_bytes {
            return Err(SecurityError::HeaderTooLarge(name.to_string()));
        }
        if !config.use_proxy_headers
        && config.forbidden_headers.iter().any(|h| h.eq_ignore_ascii_case(name.as_str()))
        {
            return Err(SecurityError::ForbiddenHeader(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn rejects_too_many_headers() {
        let mut config = SecurityConfig::default();
        config.max_header_count = 2;
        let mut headers = HeaderMap::new();
        headers.insert("a", HeaderValue::from_static("1"));
        headers.insert("b", HeaderValue::from_static("2"));
        headers.insert("c", HeaderValue::from_static("3"));
        assert!(matches!(validate_headers(&headers, &config), Err(SecurityError::TooManyHeaders(3))));
    }

    #[test]
    fn rejects_oversized_header_value() {
        let mut config = SecurityConfig::default();
        config.max_header_size_bytes = 4;
        let mut headers = HeaderMap::new();
        headers.insert("x-big", HeaderValue::from_static("too-long-value"));
        assert!(matches!(validate_headers(&headers, &config), Err(SecurityError::HeaderTooLarge(_))));
    }

    #[test]
    fn rejects_forwarded_proto_without_proxy_trust() {
        let config = SecurityConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert!(matches!(validate_headers(&headers, &config), Err(SecurityError::ForbiddenHeader(_))));
    }

    #[test]
    fn allows_forwarded_proto_with_proxy_trust_enabled() {
        let mut config = SecurityConfig::default();
        config.use_proxy_headers = true;
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert!(validate_headers(&headers, &config).is_ok());
    }
}
