// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connectivity monitoring.
//!
//! The platform adapter pushes [`NetworkStatus`] snapshots into a
//! [`NetworkMonitor`] via [`report`](NetworkMonitor::report); consumers read
//! the current snapshot or hold a [`NetworkSubscription`]. The monitor never
//! touches the mutation queue: the sync engine subscribes and decides to drain.
//!
//! # Example
//!
//! ```
//! use ledger_sync::{NetworkMonitor, NetworkStatus, ConnectionQuality};
//!
//! let monitor = NetworkMonitor::new(NetworkStatus::offline());
//! assert_eq!(monitor.quality(), ConnectionQuality::Offline);
//!
//! monitor.report(NetworkStatus::online().with_effective_type("3g"));
//! assert!(monitor.is_online());
//! assert_eq!(monitor.quality(), ConnectionQuality::Good);
//! ```

use std::fmt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Connectivity snapshot. Replaced wholesale on every report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    /// "4g" | "3g" | "2g" as reported by the platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_type: Option<String>,
    /// Estimated bandwidth in Mbit/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downlink: Option<f64>,
    /// Estimated round trip in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt: Option<u32>,
}

impl NetworkStatus {
    #[must_use]
    pub fn online() -> Self {
        Self { online: true, ..Default::default() }
    }

    #[must_use]
    pub fn offline() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_effective_type(mut self, effective_type: &str) -> Self {
        self.effective_type = Some(effective_type.to_string());
        self
    }

    #[must_use]
    pub fn with_connection_type(mut self, connection_type: &str) -> Self {
        self.connection_type = Some(connection_type.to_string());
        self
    }

    #[must_use]
    pub fn with_link(mut self, downlink: f64, rtt: u32) -> Self {
        self.downlink = Some(downlink);
        self.rtt = Some(rtt);
        self
    }
}

/// Coarse link quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Poor,
    Offline,
    Unknown,
}

impl ConnectionQuality {
    /// Pure classification by `effective_type`.
    #[must_use]
    pub fn classify(status: &NetworkStatus) -> Self {
        if !status.online {
            return Self::Offline;
        }
        match status.effective_type.as_deref() {
            Some("4g") => Self::Excellent,
            Some("3g") => Self::Good,
            Some("2g") => Self::Poor,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Poor => "poor",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Read side of connectivity, as seen by the engine.
pub trait NetworkProbe: Send + Sync {
    fn current(&self) -> NetworkStatus;
    fn subscribe(&self) -> NetworkSubscription;

    fn is_online(&self) -> bool {
        self.current().online
    }
}

/// Subscriber-owned handle. Dropping it unsubscribes.
///
/// Snapshots are coalesced: a slow subscriber sees the latest state, not
/// every intermediate one.
#[derive(Debug)]
pub struct NetworkSubscription {
    rx: watch::Receiver<NetworkStatus>,
}

impl NetworkSubscription {
    /// Wait for the next change. `None` once the monitor is gone.
    pub async fn changed(&mut self) -> Option<NetworkStatus> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Latest snapshot without waiting.
    #[must_use]
    pub fn current(&self) -> NetworkStatus {
        self.rx.borrow().clone()
    }
}

/// Publishes connectivity transitions to subscribers.
pub struct NetworkMonitor {
    tx: watch::Sender<NetworkStatus>,
}

impl NetworkMonitor {
    #[must_use]
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the snapshot. Subscribers are woken only if it actually changed.
    pub fn report(&self, status: NetworkStatus) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }

            match (current.online, status.online) {
                (false, true) => info!(quality = %ConnectionQuality::classify(&status), "Network: online"),
                (true, false) => warn!("Network: offline"),
                _ => debug!(
                    from = %ConnectionQuality::classify(current),
                    to = %ConnectionQuality::classify(&status),
                    "Network quality changed"
                ),
            }
            crate::metrics::set_network_online(status.online);

            *current = status;
            true
        });
    }

    /// Convenience for adapters that only know online/offline.
    pub fn set_online(&self, online: bool) {
        let mut status = self.status();
        if status.online == online {
            return;
        }
        status.online = online;
        self.report(status);
    }

    #[must_use]
    pub fn status(&self) -> NetworkStatus {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    #[must_use]
    pub fn quality(&self) -> ConnectionQuality {
        ConnectionQuality::classify(&self.tx.borrow())
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::offline())
    }
}

impl NetworkProbe for NetworkMonitor {
    fn current(&self) -> NetworkStatus {
        self.status()
    }

    fn subscribe(&self) -> NetworkSubscription {
        NetworkSubscription { rx: self.tx.subscribe() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_quality_classification() {
        let online = NetworkStatus::online();
        assert_eq!(ConnectionQuality::classify(&online.clone().with_effective_type("4g")), ConnectionQuality::Excellent);
        assert_eq!(ConnectionQuality::classify(&online.clone().with_effective_type("3g")), ConnectionQuality::Good);
        assert_eq!(ConnectionQuality::classify(&online.clone().with_effective_type("2g")), ConnectionQuality::Poor);
        assert_eq!(ConnectionQuality::classify(&online.clone().with_effective_type("slow-2g")), ConnectionQuality::Unknown);
        assert_eq!(ConnectionQuality::classify(&online), ConnectionQuality::Unknown);
        // Offline wins over whatever the link reports
        assert_eq!(
            ConnectionQuality::classify(&NetworkStatus::offline().with_effective_type("4g")),
            ConnectionQuality::Offline
        );
    }

    #[tokio::test]
    async fn test_subscription_sees_transition() {
        let monitor = NetworkMonitor::default();
        let mut sub = monitor.subscribe();

        monitor.set_online(true);

        let next = tokio::time::timeout(Duration::from_secs(1), sub.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(next.online);
        assert!(sub.current().online);
    }

    #[tokio::test]
    async fn test_identical_report_does_not_notify() {
        let monitor = NetworkMonitor::new(NetworkStatus::online());
        let mut sub = monitor.subscribe();

        monitor.report(NetworkStatus::online());

        let waited = tokio::time::timeout(Duration::from_millis(50), sub.changed()).await;
        assert!(waited.is_err(), "no change should have been published");
    }

    #[tokio::test]
    async fn test_quality_change_notifies_while_online() {
        let monitor = NetworkMonitor::new(NetworkStatus::online().with_effective_type("4g"));
        let mut sub = monitor.subscribe();

        monitor.report(NetworkStatus::online().with_effective_type("2g"));

        let next = sub.changed().await.unwrap();
        assert_eq!(ConnectionQuality::classify(&next), ConnectionQuality::Poor);
    }

    #[tokio::test]
    async fn test_dropping_subscription_disposes_it() {
        let monitor = NetworkMonitor::default();
        let sub = monitor.subscribe();
        assert_eq!(monitor.subscriber_count(), 1);

        drop(sub);
        assert_eq!(monitor.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_ends_when_monitor_dropped() {
        let monitor = NetworkMonitor::default();
        let mut sub = monitor.subscribe();
        drop(monitor);

        assert!(sub.changed().await.is_none());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = NetworkStatus::online().with_effective_type("4g").with_link(10.0, 50);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["effectiveType"], "4g");
        assert_eq!(json["rtt"], 50);
        assert!(json.get("connectionType").is_none());
    }
}
