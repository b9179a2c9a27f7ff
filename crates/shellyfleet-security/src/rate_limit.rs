use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::config::RateLimitConfig;
use crate::error::SecurityError;

/// A single bucket's recent-hit timestamps, pruned to `window` on every
/// check. Idle buckets are reaped by the periodic cleanup sweep.
#[derive(Debug, Default)]
struct Bucket {
    hits: VecDeque<Instant>,
    last_seen: Option<Instant>,
}

/// Stage 6: sliding-window rate limiter keyed by `(ip, path-class)`.
/// `path-class` is the caller's choice of granularity — typically the
/// route's path template, so `/devices/:id` and `/devices/:other_id` share
/// one bucket.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<(IpAddr, String), Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter::default()
    }

    pub async fn check(&self, ip: IpAddr, path_class: &str, config: &RateLimitConfig) -> Result<(), SecurityError> {
        let limit = config.limit_for_path(path_class);
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        let bucket = buckets.entry((ip, path_class.to_string())).or_default();
        bucket.last_seen = Some(now);

        while let Some(&oldest) = bucket.hits.front() {
            if now.duration_since(oldest) > config.window {
                bucket.hits.pop_front();
            } else {
                break;
            }
        }

        if bucket.hits.len() as u32 >= limit {
            let retry_after = bucket
            .hits
            .front()
            .map(|oldest| config.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(config.window);
            return Err(SecurityError::RateLimited { retry_after_secs: retry_after.as_secs().max(1) });
        }

        bucket.hits.push_back(now);
        Ok(())
    }

    /// Evicts buckets idle for longer than `idle_for`.
    pub async fn cleanup(&self, idle_for: Duration) {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        buckets.retain(|_, bucket| bucket.last_seen.map(|seen| now.duration_since(seen) <= idle_for).unwrap_or(false));
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(limit: u32, window: Duration) -> RateLimitConfig {
        RateLimitConfig { window, global_limit: limit, path_overrides: HashMap::new() }
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new();
        let cfg = config(3, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..3 {
            assert!(limiter.check(ip, "/api/v1/devices", &cfg).await.is_ok());
        }
        assert!(matches!(limiter.check(ip, "/api/v1/devices", &cfg).await, Err(SecurityError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn separate_path_classes_have_independent_buckets() {
        let limiter = RateLimiter::new();
        let cfg = config(1, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip, "/api/v1/devices", &cfg).await.is_ok());
        assert!(limiter.check(ip, "/api/v1/notifications", &cfg).await.is_ok());
        assert!(limiter.check(ip, "/api/v1/devices", &cfg).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_evicts_idle_buckets() {
        let limiter = RateLimiter::new();
        let cfg = config(1, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        limiter.check(ip, "/api/v1/devices", &cfg).await.unwrap();
        assert_eq!(limiter.bucket_count().await, 1);
        limiter.cleanup(Duration::from_secs(0)).await;
        assert_eq!(limiter.bucket_count().await, 0);
    }
}
