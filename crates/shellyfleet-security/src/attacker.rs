use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::config::AttackerConfig;
use crate::suspicious::AttackKind;

const RATE_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Default, Clone)]
struct Record {
    suspicious_hits: u64,
    rate_violations: u64,
    distinct_kinds: std::collections::HashSet<AttackKindKey>,
    /// Timestamps of suspicious hits within the trailing `RATE_WINDOW`,
    /// pruned on every observation — the count of these approximates the
    /// per-hour rate without needing a synthetic minimum window.
    suspicious_window: VecDeque<Instant>,
    first_seen: Option<Instant>,
    last_seen: Option<Instant>,
    blocked_until: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AttackKindKey(u8);

impl From<AttackKind> for AttackKindKey {
    fn from(kind: AttackKind) -> Self {
        AttackKindKey(kind as u8)
    }
}

/// Stage 7: tallies suspicious hits and rate-limit violations per
/// IP and decides when an IP crosses into a temporary block. Four
/// independent triggers, any one of which blocks: a raw suspicious-hit
/// count, a rate-violation count, a distinct-attack-type count, and a
/// sustained suspicious-hit rate — each catching a different kind of
/// repeat offender.
#[derive(Debug, Default)]
pub struct AttackerTracker {
    records: RwLock<HashMap<IpAddr, Record>>,
}

pub enum Observation {
    Suspicious(AttackKind),
    RateViolation,
}

impl AttackerTracker {
    pub fn new() -> Self {
        AttackerTracker::default()
    }

    /// Returns `Some(blocked_until)` if `ip` is currently blocked. A block
    /// that has expired resets the record to zero so the next observation
    /// re-evaluates from scratch rather than immediately re-blocking on
    /// stale counters.
    pub async fn check_blocked(&self, ip: IpAddr) -> Option<DateTime<Utc>> {
        let now = Instant::now();
        {
            let records = self.records.read().await;
            let record = records.get(&ip)?;
            let until = record.blocked_until?;
            if until > now {
                let remaining = until.duration_since(now);
                return Some(Utc::now() + chrono::Duration::from_std(remaining).unwrap_or_default());
            }
        }

        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&ip) {
            if record.blocked_until.map(|until| until <= now).unwrap_or(false) {
                *record = Record::default();
            }
        }
        None
    }

    /// Records an observation for `ip` and blocks it if any threshold is
    /// now exceeded.
    pub async fn observe(&self, ip: IpAddr, observation: Observation, config: &AttackerConfig) {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let record = records.entry(ip).or_default();
        record.first_seen.get_or_insert(now);
        record.last_seen = Some(now);

        match observation {
            Observation::Suspicious(kind) => {
                record.suspicious_hits += 1;
                record.distinct_kinds.insert(kind.into());
                record.suspicious_window.push_back(now);
            }
            Observation::RateViolation => {
                record.rate_violations += 1;
            }
        }

        while let Some(&oldest) = record.suspicious_window.front() {
            if now.duration_since(oldest) > RATE_WINDOW {
                record.suspicious_window.pop_front();
            } else {
                break;
            }
        }
        // Count of suspicious hits still inside the trailing hour — this
        // only exceeds the threshold once hits are actually sustained,
        // unlike hits-divided-by-elapsed-time which blows up for a lone
        // early hit.
        let suspicious_rate = record.suspicious_window.len() as f64;

        let should_block = record.suspicious_hits >= config.suspicious_threshold
        || record.rate_violations >= config.rate_violation_threshold
        || record.distinct_kinds.len() >= config.distinct_attack_type_threshold
        || suspicious_rate > config.suspicious_rate_per_hour;

        if should_block {
            record.blocked_until = Some(now + config.block_duration);
        }
    }

    /// Evicts records idle for longer than `idle_for`.
    pub async fn cleanup(&self, idle_for: Duration) {
        let now = Instant::now();
        let mut records = self.records.write().await;
        records.retain(|_, record| record.last_seen.map(|seen| now.duration_since(seen) <= idle_for).unwrap_or(false));
    }

    pub async fn tracked_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AttackerConfig {
        AttackerConfig {
            block_duration: Duration::from_secs(3600),
            suspicious_threshold: 3,
            rate_violation_threshold: 2,
            distinct_attack_type_threshold: 2,
            suspicious_rate_per_hour: 1000.0,
        }
    }

    #[tokio::test]
    async fn blocks_after_suspicious_threshold() {
        let tracker = AttackerTracker::new();
        let cfg = config();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..3 {
            tracker.observe(ip, Observation::Suspicious(AttackKind::SqlInjection), &cfg).await;
        }
        assert!(tracker.check_blocked(ip).await.is_some());
    }

    #[tokio::test]
    async fn blocks_after_rate_violation_threshold() {
        let tracker = AttackerTracker::new();
        let cfg = config();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        tracker.observe(ip, Observation::RateViolation, &cfg).await;
        tracker.observe(ip, Observation::RateViolation, &cfg).await;
        assert!(tracker.check_blocked(ip).await.is_some());
    }

    #[tokio::test]
    async fn blocks_after_distinct_attack_types() {
        let tracker = AttackerTracker::new();
        let cfg = config();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        tracker.observe(ip, Observation::Suspicious(AttackKind::SqlInjection), &cfg).await;
        tracker.observe(ip, Observation::Suspicious(AttackKind::Xss), &cfg).await;
        assert!(tracker.check_blocked(ip).await.is_some());
    }

    #[tokio::test]
    async fn unrelated_ip_stays_unblocked() {
        let tracker = AttackerTracker::new();
        let cfg = config();
        let attacker: IpAddr = "127.0.0.1".parse().unwrap();
        let bystander: IpAddr = "127.0.0.2".parse().unwrap();
        for _ in 0..3 {
            tracker.observe(attacker, Observation::Suspicious(AttackKind::SqlInjection), &cfg).await;
        }
        assert!(tracker.check_blocked(bystander).await.is_none());
    }

    #[tokio::test]
    async fn lone_suspicious_hit_does_not_trigger_rate_block() {
        let tracker = AttackerTracker::new();
        let mut cfg = config();
        cfg.suspicious_threshold = 100;
        cfg.distinct_attack_type_threshold = 100;
        cfg.suspicious_rate_per_hour = 5.0;
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        tracker.observe(ip, Observation::Suspicious(AttackKind::SqlInjection), &cfg).await;
        assert!(tracker.check_blocked(ip).await.is_none());
    }

    #[tokio::test]
    async fn sustained_rate_blocks_once_threshold_exceeded() {
        let tracker = AttackerTracker::new();
        let mut cfg = config();
        cfg.suspicious_threshold = 100;
        cfg.distinct_attack_type_threshold = 100;
        cfg.suspicious_rate_per_hour = 5.0;
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..6 {
            tracker.observe(ip, Observation::Suspicious(AttackKind::SqlInjection), &cfg).await;
        }
        assert!(tracker.check_blocked(ip).await.is_some());
    }

    #[tokio::test]
    async fn block_resets_after_expiry() {
        let tracker = AttackerTracker::new();
        let mut cfg = config();
        cfg.block_duration = Duration::from_millis(20);
        cfg.suspicious_threshold = 1;
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        tracker.observe(ip, Observation::Suspicious(AttackKind::SqlInjection), &cfg).await;
        assert!(tracker.check_blocked(ip).await.is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(tracker.check_blocked(ip).await.is_none());

        let records = tracker.records.read().await;
        let record = records.get(&ip).expect("record retained, zeroed, after expiry");
        assert_eq!(record.suspicious_hits, 0);
        assert!(record.blocked_until.is_none());
    }
}
