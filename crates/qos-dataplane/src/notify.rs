//! Congestion notification channel
//!
//! Carries (rule, queue, reason, packet) tuples to whoever encodes the
//! on-wire warning. Sending never blocks: a full channel drops the
//! notification, not the packet.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use qos_classifier::ClassRule;
use qos_common::{AtomicCounter, Packet, Violation};
use std::sync::Arc;

/// Log every this many overflowed notifications
const OVERFLOW_LOG_INTERVAL: u64 = 1024;

/// One notification request
#[derive(Debug, Clone)]
pub struct Notification {
    /// Rule the packet was classified under
    pub rule: Arc<ClassRule>,
    /// Queue the packet was bound for
    pub queue: u32,
    /// Reason for the notification
    pub reason: Violation,
    /// Offending packet
    pub packet: Packet,
}

/// Sending half of the notification channel
pub struct Notifier {
    tx: Sender<Notification>,
    overflow: AtomicCounter,
}

impl Notifier {
    /// Create a notifier and its receiving end
    pub fn channel(capacity: usize) -> (Self, Receiver<Notification>) {
        let (tx, rx) = bounded(capacity);
        let notifier = Self {
            tx,
            overflow: AtomicCounter::new(0),
        };
        (notifier, rx)
    }

    /// Best-effort send; returns whether the notification was queued
    pub fn notify(&self, notification: Notification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(n)) | Err(TrySendError::Disconnected(n)) => {
                let dropped = self.overflow.inc();
                if dropped % OVERFLOW_LOG_INTERVAL == 0 {
                    tracing::warn!(queue = n.queue, dropped = dropped + 1, "notification channel full");
                }
                false
            }
        }
    }

    /// Notifications dropped so far
    pub fn overflowed(&self) -> u64 {
        self.overflow.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use qos_common::PacketHeader;

    fn notification(queue: u32) -> Notification {
        Notification {
            rule: Arc::new(ClassRule::default_rule()),
            queue,
            reason: Violation::QueueCongested,
            packet: Packet::new(PacketHeader::default(), Bytes::from_static(b"pkt")),
        }
    }

    #[test]
    fn test_full_channel_drops() {
        let (notifier, rx) = Notifier::channel(2);
        assert!(notifier.notify(notification(1)));
        assert!(notifier.notify(notification(2)));
        assert!(!notifier.notify(notification(3)));
        assert_eq!(notifier.overflowed(), 1);

        assert_eq!(rx.try_recv().unwrap().queue, 1);
        assert!(notifier.notify(notification(4)));
    }

    #[test]
    fn test_disconnected_receiver_does_not_block() {
        let (notifier, rx) = Notifier::channel(1);
        drop(rx);
        assert!(!notifier.notify(notification(1)));
    }
}
