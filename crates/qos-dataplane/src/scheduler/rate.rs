//! Rate-based round robin with CIR/PIR buckets and a surplus pool
//!
//! ```text
//!            ┌──────── global bucket (bandwidth) ────────┐
//!   queue i: │ CIR (min%) ── spent first                 │
//!            │ PIR (max%) ── bursts, backed by surplus   │
//!            └───────────────────────────────────────────┘
//!                    ▲ unspent CIR paid in after each turn
//!              SurplusPool (max_credit)
//! ```
//!
//! Each cycle every queue gets a packet quantum proportional to its committed
//! share of `cycle_budget` and pops it in batches of `batch_size`. Packets
//! that fail the rate gate are still forwarded on debt, but end the queue's
//! turn once the current batch is out. A queue whose PIR bucket, or the
//! global bucket, is in debt sits out until refills bring it back to zero.

use super::{require_queues, CycleReport, Forwarder, Scheduler, SurplusPool};
use crate::bucket::TokenBucket;
use crate::queue::PacketQueue;
use parking_lot::Mutex;
use qos_common::{QosResult, QueueConfig, SchedulerConfig};
use std::sync::Arc;

/// How a packet was paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Committed,
    Surplus,
    Overage,
}

struct Slot {
    queue: Arc<dyn PacketQueue>,
    config: Arc<QueueConfig>,
    cir: TokenBucket,
    pir: TokenBucket,
}

impl Slot {
    fn new(queue: Arc<dyn PacketQueue>, bandwidth: u64) -> Self {
        let config = queue.state().config();
        Self {
            cir: TokenBucket::new(share(bandwidth, config.min_bandwidth)),
            pir: TokenBucket::new(share(bandwidth, config.max_bandwidth)),
            queue,
            config,
        }
    }

    /// Rebuild buckets if the queue was reconfigured since the last cycle
    fn sync(&mut self, bandwidth: u64) {
        let current = self.queue.state().config();
        if Arc::ptr_eq(&current, &self.config) {
            return;
        }
        if current.min_bandwidth != self.config.min_bandwidth {
            self.cir.init(share(bandwidth, current.min_bandwidth));
        }
        if current.max_bandwidth != self.config.max_bandwidth {
            self.pir.init(share(bandwidth, current.max_bandwidth));
        }
        tracing::debug!(
            queue = current.id,
            min = current.min_bandwidth,
            max = current.max_bandwidth,
            "queue rates updated"
        );
        self.config = current;
    }
}

/// Canonical discipline
pub struct RateRoundRobin {
    slots: Vec<Slot>,
    global: TokenBucket,
    surplus: Mutex<SurplusPool>,
    bandwidth: u64,
    cycle_budget: usize,
    batch_size: usize,
    cycle_period_ms: u64,
}

impl RateRoundRobin {
    /// Build CIR/PIR buckets for every queue and an empty surplus pool
    pub fn new(config: &SchedulerConfig, queues: Vec<Arc<dyn PacketQueue>>) -> QosResult<Self> {
        require_queues(&queues)?;
        let count = queues.len();
        let slots = queues
            .into_iter()
            .map(|queue| Slot::new(queue, config.bandwidth))
            .collect();
        Ok(Self {
            slots,
            global: TokenBucket::new(config.bandwidth),
            surplus: Mutex::new(SurplusPool::new(config.max_credit(), count)),
            bandwidth: config.bandwidth,
            cycle_budget: config.cycle_budget,
            batch_size: config.batch_size.max(1),
            cycle_period_ms: config.cycle_period_ms,
        })
    }

    /// Per-queue packet quantum for this cycle
    ///
    /// Proportional to `min_bandwidth` over the sum of all committed shares;
    /// an equal split when nobody has a committed share. Queues without a
    /// share still get one packet so best-effort traffic is not starved.
    fn quanta(&self) -> Vec<usize> {
        let sum: u64 = self.slots.iter().map(|s| u64::from(s.config.min_bandwidth)).sum();
        if sum == 0 {
            let equal = (self.cycle_budget / self.slots.len()).max(1);
            return vec![equal; self.slots.len()];
        }
        self.slots
            .iter()
            .map(|s| {
                let q = self.cycle_budget as u64 * u64::from(s.config.min_bandwidth) / sum;
                (q as usize).max(1)
            })
            .collect()
    }

    /// Current surplus balance
    pub fn surplus_credit(&self) -> i64 {
        self.surplus.lock().credit()
    }
}

fn gate(global: &mut TokenBucket, slot: &mut Slot, surplus: &Mutex<SurplusPool>, len: u64) -> Gate {
    if global.available(len) {
        if slot.cir.take(len) {
            global.take(len);
            slot.pir.force_take(len);
            return Gate::Committed;
        }
        if slot.pir.available(len) {
            let mut pool = surplus.lock();
            if pool.take(len) {
                global.take(len);
                slot.pir.take(len);
                return Gate::Surplus;
            }
        }
    }
    global.force_take(len);
    slot.cir.force_take(len);
    slot.pir.force_take(len);
    Gate::Overage
}

impl Scheduler for RateRoundRobin {
    fn name(&self) -> &'static str {
        "rate_round_robin"
    }

    fn run_cycle(&mut self, forwarder: &dyn Forwarder) -> CycleReport {
        let mut report = CycleReport::default();

        for slot in &mut self.slots {
            slot.sync(self.bandwidth);
        }
        let quanta = self.quanta();
        self.global.refill();

        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.cir.refill();
            slot.pir.refill();
            let reclaimed = self.surplus.lock().withdraw(i);
            slot.cir.refund(reclaimed);

            // debt from earlier overage is repaid by refills before anything else leaves
            if slot.pir.tokens() < 0 || self.global.tokens() < 0 {
                tracing::trace!(
                    queue = slot.config.id,
                    pir = slot.pir.tokens(),
                    global = self.global.tokens(),
                    "in debt, turn skipped"
                );
                continue;
            }

            let quantum = quanta[i];
            let mut served = 0;
            let mut cir_spent: i64 = 0;
            let mut overran = false;

            while served < quantum && !overran {
                let batch = slot.queue.pop_multiple(self.batch_size.min(quantum - served));
                if batch.is_empty() {
                    break;
                }
                served += batch.len();

                for pkt in batch {
                    let len = pkt.packet.len();
                    match gate(&mut self.global, slot, &self.surplus, len as u64) {
                        Gate::Committed => cir_spent += len as i64,
                        Gate::Surplus => {}
                        Gate::Overage => {
                            overran = true;
                            report.overage += 1;
                        }
                    }
                    report.record(len);
                    forwarder.forward(pkt.packet);
                }
            }

            if overran {
                tracing::trace!(queue = slot.config.id, served, "rate exceeded, turn ended early");
                continue;
            }

            let allotment = slot.cir.capacity().saturating_mul(self.cycle_period_ms as i64) / 1000;
            let unspent = (allotment - cir_spent).min(slot.cir.tokens());
            if unspent > 0 {
                let accepted = self.surplus.lock().pay(i, unspent as u64);
                slot.cir.force_take(accepted);
            }
        }

        report
    }
}

#[inline]
fn share(bandwidth: u64, percent: u32) -> u64 {
    bandwidth.saturating_mul(u64::from(percent)) / 100
}
