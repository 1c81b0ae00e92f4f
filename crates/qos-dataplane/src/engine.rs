//! QoS engine
//!
//! Wires the classifier, per-class queues, the worker pool and the scheduler
//! together. Workers pull packets from a bounded inbound channel and run the
//! classify/police/enqueue step; one scheduler thread drains the queues.
//!
//! Rules and queue parameters are published together as one [`Generation`].
//! A packet loads the generation once, so it never sees new rules paired
//! with old queue settings or the reverse.

use crate::notify::{Notification, Notifier};
use crate::queue::{build_queue, normalize, profile_action, PacketQueue, QPkt};
use crate::scheduler::{build_scheduler, Forwarder, SchedulerDriver};
use crate::stats::{QosStats, QosStatsSnapshot};
use arc_swap::ArcSwap;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use qos_classifier::{Classifier, ClassifierStats, RuleSet};
use qos_common::{
    Action, EngineConfig, Packet, QosConfig, QosError, QosResult, QueueConfig, SchedulerConfig, Violation,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long an idle worker waits before re-checking the running flag
const WORKER_POLL: Duration = Duration::from_millis(100);

/// Rules and queue parameters that are live together
pub struct Generation {
    /// Rule set packets are classified against
    pub rules: Arc<RuleSet>,
    /// Queue parameters, indexed like the engine's queues
    pub queues: Vec<Arc<QueueConfig>>,
}

/// The classify/police/enqueue pipeline shared by all workers
pub struct QosCore {
    classifier: Classifier,
    generation: ArcSwap<Generation>,
    reload_lock: Mutex<()>,
    queues: Vec<Arc<dyn PacketQueue>>,
    slots: HashMap<u32, usize>,
    notifier: Notifier,
    stats: Arc<QosStats>,
}

impl QosCore {
    fn new(config: &QosConfig, notifier: Notifier) -> QosResult<Self> {
        let classifier = Classifier::new(&config.rules, config.engine.cache_capacity)?;
        let queues: Vec<_> = config
            .queues
            .iter()
            .map(|q| build_queue(config.engine.queue_backend, q.clone()))
            .collect();
        let slots = config.queues.iter().enumerate().map(|(i, q)| (q.id, i)).collect();
        let generation = Generation {
            rules: classifier.snapshot(),
            queues: queues.iter().map(|q| q.state().config()).collect(),
        };

        Ok(Self {
            classifier,
            generation: ArcSwap::from_pointee(generation),
            reload_lock: Mutex::new(()),
            queues,
            slots,
            notifier,
            stats: Arc::new(QosStats::default()),
        })
    }

    /// Classify, police and enqueue one packet
    ///
    /// Never fails: every outcome is an [`Action`]. The returned action is
    /// informational; dropped packets are already gone.
    pub fn queue_packet(&self, packet: Packet) -> Action {
        self.stats.received.inc();

        let generation = self.generation.load();
        let rule = generation.rules.resolve(&packet.header);
        // rules only reference configured queues; 0 is always present
        let slot = self
            .slots
            .get(&rule.queue_number)
            .or_else(|| self.slots.get(&0))
            .copied()
            .unwrap_or(0);
        let queue = &self.queues[slot];
        let config = &generation.queues[slot];
        let queue_id = config.id;

        let policed = queue.state().police_at_rate(config.police_rate, packet.len());
        let fill_level = queue.len() as f64 / config.max_length.max(1) as f64;
        let profiled = profile_action(config, fill_level, &mut rand::thread_rng());
        let mut action = policed.merge(profiled);
        let mut reason = if policed == Action::Drop {
            Violation::BandwidthExceeded
        } else {
            Violation::QueueCongested
        };

        if action.forwards() && !queue.blocks_when_full() && queue.len() >= config.max_length {
            action = Action::DropNotify;
            reason = Violation::QueueFull;
        }

        tracing::trace!(rule = %rule.name, queue = queue_id, ?action, len = packet.len(), "classified");

        if action.notifies() {
            let notification = Notification {
                rule,
                queue: queue_id,
                reason,
                packet: packet.clone(),
            };
            if self.notifier.notify(notification) {
                self.stats.notified.inc();
            } else {
                self.stats.notifications_dropped.inc();
            }
        }

        if action.forwards() {
            queue.enqueue(QPkt {
                queue: queue_id,
                action,
                packet,
            });
            self.stats.enqueued.inc();
        } else {
            self.stats.dropped.inc();
        }

        action
    }

    /// Queue by id
    pub fn queue(&self, id: u32) -> Option<&Arc<dyn PacketQueue>> {
        self.slots.get(&id).map(|&i| &self.queues[i])
    }

    /// Rule set of the live generation
    pub fn rules(&self) -> Arc<RuleSet> {
        Arc::clone(&self.generation.load().rules)
    }

    /// Live generation
    pub fn generation(&self) -> Arc<Generation> {
        self.generation.load_full()
    }

    /// Publish rules and queue parameters as one generation
    ///
    /// Reloads are serialized; on error nothing changes.
    fn reload(&self, config: QosConfig) -> QosResult<u64> {
        let _guard = self.reload_lock.lock();

        let checked = config.validate().and_then(|()| {
            let mut ids = config.queue_ids();
            ids.sort_unstable();
            if ids != self.queue_ids() {
                return Err(QosError::QueueLayoutChanged);
            }
            Ok(())
        });
        if let Err(e) = checked {
            tracing::warn!(error = %e, "rejected configuration reload");
            return Err(e);
        }

        let rules = self.classifier.build(&config.rules)?;
        let mut queues = self.generation.load().queues.clone();
        for queue in config.queues {
            if let Some(&slot) = self.slots.get(&queue.id) {
                queues[slot] = Arc::new(normalize(queue));
            }
        }

        let rules = self.classifier.publish(rules);
        let version = rules.version();
        self.generation.store(Arc::new(Generation {
            rules,
            queues: queues.clone(),
        }));
        // the scheduler reads queue parameters through the queues themselves
        for (queue, config) in self.queues.iter().zip(queues) {
            queue.state().replace(config);
        }
        Ok(version)
    }

    fn queue_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.slots.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Combined statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatsSnapshot {
    /// Packet path counters
    pub packets: QosStatsSnapshot,
    /// Rule set and cache counters
    pub classifier: ClassifierStats,
}

/// QoS engine
///
/// Manages:
/// - The classification worker pool
/// - Per-class queues and their policers
/// - The scheduler thread
pub struct QosEngine {
    core: Arc<QosCore>,
    scheduler: SchedulerConfig,
    engine: EngineConfig,
    inbound_tx: Sender<Packet>,
    inbound_rx: Receiver<Packet>,
    notifications: Receiver<Notification>,
    running: Arc<AtomicBool>,
    workers: Vec<thread::JoinHandle<()>>,
    driver: Option<SchedulerDriver>,
}

impl QosEngine {
    /// Validate `config` and build queues and rule index
    pub fn new(config: QosConfig) -> QosResult<Self> {
        config.validate()?;

        let (notifier, notifications) = Notifier::channel(config.engine.notification_capacity);
        let core = QosCore::new(&config, notifier)?;
        let (inbound_tx, inbound_rx) = bounded(config.engine.inbound_capacity);

        tracing::info!(
            queues = config.queues.len(),
            rules = config.rules.len(),
            discipline = ?config.scheduler.discipline,
            "QoS engine created"
        );

        Ok(Self {
            core: Arc::new(core),
            scheduler: config.scheduler,
            engine: config.engine,
            inbound_tx,
            inbound_rx,
            notifications,
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            driver: None,
        })
    }

    /// Spawn workers and the scheduler
    pub fn start(&mut self, forwarder: Arc<dyn Forwarder>) -> QosResult<()> {
        if self.running.load(Ordering::Acquire) {
            return Err(QosError::Config("engine already running".into()));
        }
        self.running.store(true, Ordering::Release);

        if let Err(e) = self.spawn_all(forwarder) {
            self.stop();
            return Err(e);
        }

        tracing::info!(
            workers = self.workers.len(),
            discipline = ?self.scheduler.discipline,
            "QoS engine started"
        );
        Ok(())
    }

    fn spawn_all(&mut self, forwarder: Arc<dyn Forwarder>) -> QosResult<()> {
        let count = self.engine.workers.min(self.core.queues.len()).max(1);
        for id in 0..count {
            let core = Arc::clone(&self.core);
            let rx = self.inbound_rx.clone();
            let running = Arc::clone(&self.running);

            let handle = thread::Builder::new()
                .name(format!("qos-worker-{}", id))
                .spawn(move || worker_loop(id, core, rx, running))
                .map_err(|e| QosError::Spawn(format!("worker {}: {}", id, e)))?;
            self.workers.push(handle);
        }

        let scheduler = build_scheduler(&self.scheduler, self.core.queues.clone())?;
        let period = Duration::from_millis(self.scheduler.cycle_period_ms);
        let driver = SchedulerDriver::spawn(scheduler, period, forwarder, Arc::clone(&self.core.stats))?;
        self.driver = Some(driver);
        Ok(())
    }

    /// Stop workers, then the scheduler
    ///
    /// Workers go first so a worker blocked on a full channel queue is
    /// released by the still-running scheduler.
    pub fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(mut driver) = self.driver.take() {
            driver.stop();
        }

        if was_running {
            tracing::info!("QoS engine stopped");
        }
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Hand a packet to the worker pool; blocks while the inbound channel is full
    pub fn submit(&self, packet: Packet) {
        // the engine holds a receiver, so the channel cannot disconnect
        let _ = self.inbound_tx.send(packet);
    }

    /// Run the pipeline step on the calling thread
    #[inline]
    pub fn queue_packet(&self, packet: Packet) -> Action {
        self.core.queue_packet(packet)
    }

    /// Replace rules and queue parameters
    ///
    /// The set of queue ids must stay the same. On error nothing changes.
    /// Scheduler and engine settings are fixed at start and not reloaded.
    pub fn reload(&self, config: QosConfig) -> QosResult<u64> {
        let restart_only = config.scheduler != self.scheduler || config.engine != self.engine;
        let version = self.core.reload(config)?;
        if restart_only {
            tracing::info!(version, "scheduler and engine settings apply on restart only");
        }
        Ok(version)
    }

    /// Notification stream
    pub fn notifications(&self) -> Receiver<Notification> {
        self.notifications.clone()
    }

    /// Pipeline shared by the workers
    pub fn core(&self) -> &QosCore {
        &self.core
    }

    /// Statistics snapshot
    pub fn stats(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            packets: self.core.stats.snapshot(),
            classifier: self.core.generation.load().rules.stats(),
        }
    }
}

impl Drop for QosEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(id: usize, core: Arc<QosCore>, rx: Receiver<Packet>, running: Arc<AtomicBool>) {
    tracing::debug!(worker = id, "worker started");
    while running.load(Ordering::Relaxed) {
        match rx.recv_timeout(WORKER_POLL) {
            Ok(packet) => {
                core.queue_packet(packet);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!(worker = id, "worker stopped");
}
