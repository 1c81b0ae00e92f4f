//! Plain round robin

use super::{require_queues, CycleReport, Forwarder, Scheduler};
use crate::queue::PacketQueue;
use qos_common::QosResult;
use std::sync::Arc;

/// Drains every queue completely each cycle; no priorities, no rate control
pub struct RoundRobin {
    queues: Vec<Arc<dyn PacketQueue>>,
}

impl RoundRobin {
    /// Serve `queues` in order; fails on an empty list
    pub fn new(queues: Vec<Arc<dyn PacketQueue>>) -> QosResult<Self> {
        require_queues(&queues)?;
        Ok(Self { queues })
    }
}

impl Scheduler for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn run_cycle(&mut self, forwarder: &dyn Forwarder) -> CycleReport {
        let mut report = CycleReport::default();
        for queue in &self.queues {
            let len = queue.len();
            if len == 0 {
                continue;
            }
            for pkt in queue.pop_multiple(len) {
                report.record(pkt.packet.len());
                forwarder.forward(pkt.packet);
            }
        }
        report
    }
}
