//! Weighted (deficit) round robin

use super::{require_queues, CycleReport, Forwarder, Scheduler};
use crate::bucket::TokenBucket;
use crate::queue::PacketQueue;
use qos_common::{QosResult, SchedulerConfig};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Each cycle queue `i` may send up to its `priority` packets
///
/// A single global bucket caps aggregate egress. When it runs dry the loop
/// sleeps and retries instead of dropping; after the retry budget is spent
/// the packet goes out on debt.
pub struct DeficitRoundRobin {
    queues: Vec<Arc<dyn PacketQueue>>,
    global: TokenBucket,
    retry_interval: Duration,
    max_retries: u32,
}

impl DeficitRoundRobin {
    /// Share one global bucket of `config.bandwidth` across `queues`
    pub fn new(config: &SchedulerConfig, queues: Vec<Arc<dyn PacketQueue>>) -> QosResult<Self> {
        require_queues(&queues)?;
        Ok(Self {
            queues,
            global: TokenBucket::new(config.bandwidth),
            retry_interval: Duration::from_millis(config.backpressure_retry_ms),
            max_retries: config.backpressure_max_retries,
        })
    }

    /// Wait for `len` global tokens; false if forced through on debt
    fn admit(&mut self, len: u64) -> bool {
        let mut retries = 0;
        loop {
            self.global.refill();
            if self.global.take(len) {
                return true;
            }
            if retries >= self.max_retries {
                self.global.force_take(len);
                return false;
            }
            retries += 1;
            thread::sleep(self.retry_interval);
        }
    }
}

impl Scheduler for DeficitRoundRobin {
    fn name(&self) -> &'static str {
        "deficit_round_robin"
    }

    fn run_cycle(&mut self, forwarder: &dyn Forwarder) -> CycleReport {
        let mut report = CycleReport::default();
        for i in 0..self.queues.len() {
            let queue = Arc::clone(&self.queues[i]);
            // zero would starve the queue forever
            let quantum = queue.state().config().priority.max(1) as usize;

            for pkt in queue.pop_multiple(quantum) {
                let len = pkt.packet.len();
                if !self.admit(len as u64) {
                    report.overage += 1;
                    tracing::trace!(queue = pkt.queue, len, "global bucket exhausted, forwarding on debt");
                }
                report.record(len);
                forwarder.forward(pkt.packet);
            }
        }
        report
    }
}
