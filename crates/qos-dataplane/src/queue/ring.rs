//! Ring buffer queue (canonical backend)

use super::{PacketQueue, QPkt, QueueState};
use parking_lot::Mutex;
use qos_common::QueueConfig;
use std::collections::VecDeque;

/// Mutex-guarded ring buffer
///
/// Never blocks. `max_length` is a soft limit; the engine refuses to enqueue
/// once it is reached.
pub struct RingQueue {
    buffer: Mutex<VecDeque<QPkt>>,
    state: QueueState,
}

impl RingQueue {
    /// Create queue
    pub fn new(config: QueueConfig) -> Self {
        let capacity = config.max_length;
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            state: QueueState::new(config),
        }
    }
}

impl PacketQueue for RingQueue {
    #[inline]
    fn enqueue(&self, pkt: QPkt) {
        self.buffer.lock().push_back(pkt);
    }

    #[inline]
    fn pop(&self) -> Option<QPkt> {
        self.buffer.lock().pop_front()
    }

    fn pop_multiple(&self, n: usize) -> Vec<QPkt> {
        let mut buffer = self.buffer.lock();
        let n = n.min(buffer.len());
        buffer.drain(..n).collect()
    }

    #[inline]
    fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    fn blocks_when_full(&self) -> bool {
        false
    }

    fn state(&self) -> &QueueState {
        &self.state
    }
}
