use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

use crate::config::SecurityConfig;

/// Stage 9: resolves the client IP used by every earlier stage.
/// `X-Forwarded-For` is only honored when the immediate peer address is
/// inside a configured trusted-proxy CIDR and `use_proxy_headers` is on —
/// otherwise the socket's peer address is authoritative.
pub fn extract_client_ip(peer: SocketAddr, headers: &HeaderMap, config: &SecurityConfig) -> IpAddr {
    if !config.use_proxy_headers || !is_trusted_proxy(peer.ip(), config) {
        return peer.ip();
    }

    headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .and_then(|ip| ip.parse::<IpAddr>().ok())
    .unwrap_or_else(|| peer.ip())
}

fn is_trusted_proxy(ip: IpAddr, config: &SecurityConfig) -> bool {
    config.trusted_proxies.iter().any(|net| net.contains(ip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer(addr: &str) -> SocketAddr {
        addr.parse().unwrap()
    }

    #[test]
    fn uses_peer_address_when_proxy_headers_disabled() {
        let config = SecurityConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let ip = extract_client_ip(peer("10.0.0.1:443"), &headers, &config);
        assert_eq!(ip, "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn uses_peer_address_when_peer_not_trusted() {
        let mut config = SecurityConfig::default();
        config.use_proxy_headers = true;
        config.trusted_proxies = vec!["192.168.0.0/16".parse().unwrap()];
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let ip = extract_client_ip(peer("10.0.0.1:443"), &headers, &config);
        assert_eq!(ip, "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn honors_forwarded_for_from_trusted_proxy() {
        let mut config = SecurityConfig::default();
        config.use_proxy_headers = true;
        config.trusted_proxies = vec!["10.0.0.0/8".parse().unwrap()];
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let ip = extract_client_ip(peer("10.0.0.1:443"), &headers, &config);
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }
}
