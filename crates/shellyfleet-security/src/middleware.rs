use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crate::attacker::{AttackerTracker, Observation};
use crate::config::SecurityConfig;
use crate::error::SecurityError;
use crate::rate_limit::RateLimiter;
use crate::{alert, client_ip, content_type, headers, json_validate, suspicious};

/// Shared state for the middleware chain, built once at startup and cloned
/// into every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct SecurityState {
    pub config: Arc<SecurityConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub attacker_tracker: Arc<AttackerTracker>,
    pub alerts: alert::AlertSink,
}

impl SecurityState {
    pub fn new(config: SecurityConfig) -> (Self, tokio::sync::mpsc::Receiver<alert::SecurityAlert>) {
        let (alerts, rx) = alert::AlertSink::new(config.alert_channel_capacity);
        let state = SecurityState {
            config: Arc::new(config),
            rate_limiter: Arc::new(RateLimiter::new()),
            attacker_tracker: Arc::new(AttackerTracker::new()),
            alerts,
        };
        (state, rx)
    }

    /// Spawns the periodic cleanup sweeps described: the rate-limit
    /// table reaps buckets idle for 2h on a 5-minute cadence, the attacker
    /// table reaps records idle for 24h on a 1-hour cadence.
    pub fn spawn_cleanup_sweeps(&self) {
        let rate_limiter = self.rate_limiter.clone();
        tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(5 * 60));
                loop {
                    ticker.tick().await;
                    rate_limiter.cleanup(Duration::from_secs(2 * 3600)).await;
                }
        });

        let attacker_tracker = self.attacker_tracker.clone();
        tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(3600));
                loop {
                    ticker.tick().await;
                    attacker_tracker.cleanup(Duration::from_secs(24 * 3600)).await;
                }
        });
    }
}

fn error_response(err: SecurityError) -> Response {
    let status = match err.kind() {
        shellyfleet_domain::ErrorKind::Validation => StatusCode::BAD_REQUEST,
        shellyfleet_domain::ErrorKind::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        shellyfleet_domain::ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        shellyfleet_domain::ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        shellyfleet_domain::ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_REQUEST,
    };
    let retry_after_secs = match &err {
        SecurityError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
        _ => None,
    };
    let body = Json(serde_json::json!({
                "success": false,
                "error": { "code": err.kind().code(), "message": err.to_string() },
    }));
    let mut response = (status, body).into_response();
    if let Some(secs) = retry_after_secs {
        if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
    }
    response
}

/// The full nine-stage chain, applied as a single `from_fn_with_state`
/// layer so ordering is exact and the client IP is resolved
/// once and reused by every later stage.
pub async fn security_chain(
    State(state): State<SecurityState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.as_ref();

    let ip = client_ip::extract_client_ip(peer, request.headers(), config);
    let path = request.uri().path().to_string();

    if let Some(until) = state.attacker_tracker.check_blocked(ip).await {
        return error_response(SecurityError::Blocked(until));
    }

    if let Err(err) = headers::validate_headers(request.headers(), config) {
        return error_response(err);
    }

    if matches!(request.method(), &axum::http::Method::POST | &axum::http::Method::PUT | &axum::http::Method::PATCH) {
        if let Err(err) = content_type::validate_content_type(request.headers(), config) {
            return error_response(err);
        }
    }

    if let Some(query) = request.uri().query() {
        let pairs: Vec<(String, String)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
        })
        .collect();
        if let Err(err) = json_validate::validate_query_keys(&pairs) {
            return error_response(err);
        }
    }

    if suspicious::is_suspicious(&path) || request.uri().query().map(suspicious::is_suspicious).unwrap_or(false) {
        let kinds = suspicious::scan(&path);
        state.attacker_tracker.observe(ip, Observation::Suspicious(kinds.first().copied().unwrap_or(suspicious::AttackKind::ScannerUserAgent)), &config.attacker).await;
        state.alerts.emit(alert::SecurityAlert { ip, path: path.clone(), kinds, blocked: false });
    }

    let path_class = path.clone();
    if let Err(err) = state.rate_limiter.check(ip, &path_class, &config.rate_limit).await {
        state.attacker_tracker.observe(ip, Observation::RateViolation, &config.attacker).await;
        state.alerts.emit(alert::SecurityAlert { ip, path: path.clone(), kinds: vec![], blocked: false });
        return error_response(err);
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, config.max_body_bytes + 1).await {
        Ok(bytes) if bytes.len() <= config.max_body_bytes => bytes,
        Ok(_) | Err(_) => return error_response(SecurityError::PayloadTooLarge),
    };

    if !bytes.is_empty() {
        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
            if let Err(err) = json_validate::validate_json(&value, config) {
                return error_response(err);
            }
        }
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn router() -> Router {
        let (state, rx) = SecurityState::new(SecurityConfig::default());
        tokio::spawn(alert::run_alert_consumer(rx));
        Router::new()
        .route("/api/v1/devices", get(ok_handler))
        .layer(axum::middleware::from_fn_with_state(state.clone(), security_chain))
        .with_state(state)
    }

    #[tokio::test]
    async fn passes_clean_request_through() {
        let app = router();
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let mut request = HttpRequest::builder().uri("/api/v1/devices").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
