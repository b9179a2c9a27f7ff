use axum::http::HeaderMap;

use crate::config::SecurityConfig;
use crate::error::SecurityError;

/// Stage 2: requests carrying a body must declare one of the
/// allowed content types. GET/HEAD/DELETE requests without a body are not
/// checked here — the caller only invokes this when a body is present.
pub fn validate_content_type(headers: &HeaderMap, config: &SecurityConfig) -> Result<(), SecurityError> {
    let content_type = headers
    .get(axum::http::header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or("");

    let base = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if base.is_empty() {
        return Ok(());
    }
    if config.allowed_content_types.iter().any(|allowed| allowed.eq_ignore_ascii_case(&base)) {
        Ok(())
    } else {
        Err(SecurityError::UnsupportedContentType(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn accepts_json_with_charset_suffix() {
        let config = SecurityConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(validate_content_type(&headers, &config).is_ok());
    }

    #[test]
    fn rejects_unknown_content_type() {
        let config = SecurityConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        assert!(matches!(validate_content_type(&headers, &config), Err(SecurityError::UnsupportedContentType(_))));
    }

    #[test]
    fn missing_content_type_passes_through() {
        let config = SecurityConfig::default();
        let headers = HeaderMap::new();
        assert!(validate_content_type(&headers, &config).is_ok());
    }
}
