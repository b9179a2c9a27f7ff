use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct RuleState {
    last_fired: Option<DateTime<Utc>>,
    fired_at: VecDeque<DateTime<Utc>>,
}

/// Per-rule rate limiting with both `min_interval_min` (sliding, last-fired
/// timestamp) and `max_per_hour` (rolling window), mirroring the
/// attacker-tracker counter idiom.
#[derive(Default)]
pub struct RateLimiter {
    state: Mutex<HashMap<Uuid, RuleState>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` (and records the firing) if `rule_id` may fire right
    /// now under both limits; `false` leaves state untouched so the caller
    /// can record a `RateLimited` delivery event without double-counting.
    pub async fn check_and_record(&self, rule_id: Uuid, min_interval_min: u32, max_per_hour: u32, now: DateTime<Utc>) -> bool {
        let mut guard = self.state.lock().await;
        let entry = guard.entry(rule_id).or_default();

        if let Some(last) = entry.last_fired {
            if now - last < Duration::minutes(min_interval_min as i64) {
                return false;
            }
        }

        let cutoff = now - Duration::hours(1);
        entry.fired_at.retain(|t| *t > cutoff);
        if entry.fired_at.len() as u32 >= max_per_hour {
            return false;
        }

        entry.last_fired = Some(now);
        entry.fired_at.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn min_interval_blocks_immediate_refire() {
        let limiter = RateLimiter::new();
        let rule_id = Uuid::new_v4();
        let now = Utc::now();
        assert!(limiter.check_and_record(rule_id, 10, 100, now).await);
        assert!(!limiter.check_and_record(rule_id, 10, 100, now + Duration::minutes(1)).await);
        assert!(limiter.check_and_record(rule_id, 10, 100, now + Duration::minutes(11)).await);
    }

    #[tokio::test]
    async fn max_per_hour_blocks_after_cap() {
        let limiter = RateLimiter::new();
        let rule_id = Uuid::new_v4();
        let now = Utc::now();
        for i in 0..3 {
            assert!(limiter.check_and_record(rule_id, 0, 3, now + Duration::seconds(i)).await);
        }
        assert!(!limiter.check_and_record(rule_id, 0, 3, now + Duration::seconds(3)).await);
    }

    #[tokio::test]
    async fn rolling_window_forgets_entries_older_than_an_hour() {
        let limiter = RateLimiter::new();
        let rule_id = Uuid::new_v4();
        let now = Utc::now();
        assert!(limiter.check_and_record(rule_id, 0, 1, now).await);
        assert!(!limiter.check_and_record(rule_id, 0, 1, now + Duration::minutes(30)).await);
        assert!(limiter.check_and_record(rule_id, 0, 1, now + Duration::hours(1) + Duration::minutes(1)).await);
    }
}
