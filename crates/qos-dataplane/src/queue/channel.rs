//! Bounded channel queue

use super::{PacketQueue, QPkt, QueueState};
use crossbeam::channel::{bounded, Receiver, Sender};
use qos_common::QueueConfig;

/// Queue backed by a bounded MPMC channel
///
/// `enqueue` blocks the calling worker while the channel is full, pushing
/// backpressure into the classification pipeline. Capacity is fixed at
/// construction; a reload that changes `max_length` only moves the fill level.
pub struct ChannelQueue {
    tx: Sender<QPkt>,
    rx: Receiver<QPkt>,
    state: QueueState,
}

impl ChannelQueue {
    /// Create queue with capacity `max_length`
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = bounded(config.max_length.max(1));
        Self {
            tx,
            rx,
            state: QueueState::new(config),
        }
    }
}

impl PacketQueue for ChannelQueue {
    fn enqueue(&self, pkt: QPkt) {
        // both ends live in `self`, so the channel cannot disconnect
        let _ = self.tx.send(pkt);
    }

    fn pop(&self) -> Option<QPkt> {
        self.rx.try_recv().ok()
    }

    fn pop_multiple(&self, n: usize) -> Vec<QPkt> {
        self.rx.try_iter().take(n).collect()
    }

    fn len(&self) -> usize {
        self.rx.len()
    }

    fn blocks_when_full(&self) -> bool {
        true
    }

    fn state(&self) -> &QueueState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::qpkt;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_enqueue_blocks_until_popped() {
        let queue = Arc::new(ChannelQueue::new(QueueConfig { max_length: 1, ..Default::default() }));
        queue.enqueue(qpkt(0, 1));

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.enqueue(qpkt(0, 2)))
        };

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().packet.len(), 1);

        producer.join().unwrap();
        assert_eq!(queue.pop().unwrap().packet.len(), 2);
    }
}
