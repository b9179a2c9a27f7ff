use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::suspicious::AttackKind;

#[derive(Debug, Clone)]
pub struct SecurityAlert {
    pub ip: IpAddr,
    pub path: String,
    pub kinds: Vec<AttackKind>,
    pub blocked: bool,
}

/// Stage 8: a bounded channel feeding a dedicated consumer task, so
/// the request path never blocks on alert delivery. When the channel is
/// full the alert is dropped and `dropped_count` is bumped instead of
/// applying backpressure to the caller.
#[derive(Clone)]
pub struct AlertSink {
    tx: mpsc::Sender<SecurityAlert>,
    dropped: Arc<AtomicU64>,
}

impl AlertSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SecurityAlert>) {
        let (tx, rx) = mpsc::channel(capacity);
        (AlertSink { tx, dropped: Arc::new(AtomicU64::new(0)) }, rx)
    }

    /// Never awaits: a full channel means the alert is dropped, not delayed.
    pub fn emit(&self, alert: SecurityAlert) {
        if self.tx.try_send(alert).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drains alerts and logs each as a structured warning. Runs until every
/// `AlertSink` clone is dropped and the channel closes.
pub async fn run_alert_consumer(mut rx: mpsc::Receiver<SecurityAlert>) {
    while let Some(alert) = rx.recv().await {
        tracing::warn!(
            ip = %alert.ip,
            path = %alert.path,
            kinds = ?alert.kinds,
            blocked = alert.blocked,
            "security alert"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_alert_to_consumer() {
        let (sink, mut rx) = AlertSink::new(4);
        sink.emit(SecurityAlert { ip: "127.0.0.1".parse().unwrap(), path: "/x".into(), kinds: vec![], blocked: false });
        let received = rx.recv().await.unwrap();
        assert_eq!(received.path, "/x");
    }

    #[tokio::test]
    async fn drops_when_channel_full() {
        let (sink, _rx) = AlertSink::new(1);
        sink.emit(SecurityAlert { ip: "127.0.0.1".parse().unwrap(), path: "/a".into(), kinds: vec![], blocked: false });
        sink.emit(SecurityAlert { ip: "127.0.0.1".parse().unwrap(), path: "/b".into(), kinds: vec![], blocked: false });
        assert_eq!(sink.dropped_count(), 1);
    }
}
