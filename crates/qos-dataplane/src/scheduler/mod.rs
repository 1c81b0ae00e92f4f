//! Dequeue scheduling
//!
//! One scheduler instance serves every queue from a single dedicated thread.
//! Each cycle: pick queues, compute quota, pop, rate-gate, forward, update
//! bookkeeping, then sleep out the rest of the cycle period.

mod deficit;
mod rate;
mod round_robin;
mod surplus;

pub use deficit::DeficitRoundRobin;
pub use rate::RateRoundRobin;
pub use round_robin::RoundRobin;
pub use surplus::SurplusPool;

use crate::queue::PacketQueue;
use crate::stats::QosStats;
use qos_common::{Discipline, Packet, QosError, QosResult, SchedulerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Egress callback, invoked once per dequeued packet
pub trait Forwarder: Send + Sync {
    /// Send one packet onward
    fn forward(&self, packet: Packet);
}

impl<F> Forwarder for F
where
    F: Fn(Packet) + Send + Sync,
{
    #[inline]
    fn forward(&self, packet: Packet) {
        self(packet)
    }
}

/// What one cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Packets forwarded
    pub forwarded: u64,
    /// Bytes forwarded
    pub bytes: u64,
    /// Packets forwarded on borrowed (force-taken) tokens
    pub overage: u64,
}

impl CycleReport {
    #[inline]
    fn record(&mut self, len: usize) {
        self.forwarded += 1;
        self.bytes += len as u64;
    }
}

/// Dequeue discipline
pub trait Scheduler: Send {
    /// Discipline name for logs
    fn name(&self) -> &'static str;

    /// Run one scheduling cycle
    fn run_cycle(&mut self, forwarder: &dyn Forwarder) -> CycleReport;
}

/// Construct the configured discipline over `queues`
///
/// Refuses to build a scheduler with nothing to serve.
pub fn build_scheduler(
    config: &SchedulerConfig,
    queues: Vec<Arc<dyn PacketQueue>>,
) -> QosResult<Box<dyn Scheduler>> {
    let scheduler: Box<dyn Scheduler> = match config.discipline {
        Discipline::RoundRobin => Box::new(RoundRobin::new(queues)?),
        Discipline::DeficitRoundRobin => Box::new(DeficitRoundRobin::new(config, queues)?),
        Discipline::RateRoundRobin => Box::new(RateRoundRobin::new(config, queues)?),
    };
    Ok(scheduler)
}

pub(crate) fn require_queues(queues: &[Arc<dyn PacketQueue>]) -> QosResult<()> {
    if queues.is_empty() {
        return Err(QosError::NoQueues);
    }
    Ok(())
}

/// Runs a scheduler on its own thread until stopped
pub struct SchedulerDriver {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SchedulerDriver {
    /// Start the dequeue loop
    pub fn spawn(
        mut scheduler: Box<dyn Scheduler>,
        period: Duration,
        forwarder: Arc<dyn Forwarder>,
        stats: Arc<QosStats>,
    ) -> QosResult<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let name = scheduler.name();

        let handle = thread::Builder::new()
            .name(format!("qos-sched-{}", name))
            .spawn(move || {
                tracing::info!(discipline = name, period_us = period.as_micros() as u64, "scheduler started");
                while flag.load(Ordering::Relaxed) {
                    let started = Instant::now();
                    let report = scheduler.run_cycle(forwarder.as_ref());

                    stats.forwarded.add(report.forwarded);
                    stats.forwarded_bytes.add(report.bytes);
                    stats.overage.add(report.overage);
                    if report.forwarded > 0 {
                        tracing::debug!(
                            forwarded = report.forwarded,
                            bytes = report.bytes,
                            overage = report.overage,
                            "cycle"
                        );
                    }

                    if let Some(rest) = period.checked_sub(started.elapsed()) {
                        thread::sleep(rest);
                    }
                }
                tracing::info!(discipline = name, "scheduler stopped");
            })
            .map_err(|e| QosError::Spawn(format!("scheduler thread: {}", e)))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the loop and join the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SchedulerDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
