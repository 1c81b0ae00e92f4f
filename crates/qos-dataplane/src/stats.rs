//! Data plane statistics
//!
//! Lock-free counters; drops and notifications are the only failure signal
//! operators see, so everything that resolves to a policy decision lands here.

use qos_common::AtomicCounter;
use serde::Serialize;

/// Engine-wide counters
#[derive(Debug, Default)]
pub struct QosStats {
    /// Packets handed to the pipeline
    pub received: AtomicCounter,
    /// Packets accepted into a queue
    pub enqueued: AtomicCounter,
    /// Packets dropped by policer, profile or full queue
    pub dropped: AtomicCounter,
    /// Notifications delivered to the channel
    pub notified: AtomicCounter,
    /// Notifications lost to a full channel
    pub notifications_dropped: AtomicCounter,
    /// Packets passed to the forwarder
    pub forwarded: AtomicCounter,
    /// Bytes passed to the forwarder
    pub forwarded_bytes: AtomicCounter,
    /// Packets forwarded on force-taken tokens
    pub overage: AtomicCounter,
}

impl QosStats {
    /// Point-in-time copy
    pub fn snapshot(&self) -> QosStatsSnapshot {
        QosStatsSnapshot {
            received: self.received.get(),
            enqueued: self.enqueued.get(),
            dropped: self.dropped.get(),
            notified: self.notified.get(),
            notifications_dropped: self.notifications_dropped.get(),
            forwarded: self.forwarded.get(),
            forwarded_bytes: self.forwarded_bytes.get(),
            overage: self.overage.get(),
        }
    }
}

/// Stats snapshot (non-atomic)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QosStatsSnapshot {
    /// Packets handed to the pipeline
    pub received: u64,
    /// Packets placed in a queue
    pub enqueued: u64,
    /// Packets discarded by the policer, profile or full check
    pub dropped: u64,
    /// Notifications delivered
    pub notified: u64,
    /// Notifications lost to a full channel
    pub notifications_dropped: u64,
    /// Packets sent to the forwarder
    pub forwarded: u64,
    /// Bytes sent to the forwarder
    pub forwarded_bytes: u64,
    /// Packets forwarded on borrowed tokens
    pub overage: u64,
}

impl QosStatsSnapshot {
    /// Fraction of received packets that were dropped
    pub fn drop_rate(&self) -> f64 {
        if self.received == 0 {
            return 0.0;
        }
        self.dropped as f64 / self.received as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = QosStats::default();
        stats.received.add(4);
        stats.dropped.inc();
        stats.forwarded_bytes.add(1500);

        let snap = stats.snapshot();
        assert_eq!(snap.received, 4);
        assert_eq!(snap.forwarded_bytes, 1500);
        assert_eq!(snap.drop_rate(), 0.25);
    }
}
