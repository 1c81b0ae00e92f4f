//! Configuration structures consumed from the config loader
//!
//! These are the already-deserialized forms. [`QosConfig::validate`] performs
//! every check that does not require parsing rule predicates; rule parsing
//! itself happens when the classifier builds its index.

use crate::action::Action;
use crate::error::{QosError, QosResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One step of a queue's fill-level profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionProfile {
    /// Fill level (0.0..=1.0) at which this entry starts to apply
    pub fill_level: f64,
    /// Chance in percent (0..=100) that the action is taken
    pub probability: u8,
    /// Action taken when the trial succeeds
    pub action: Action,
}

/// Per-class queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue number referenced by rules
    pub id: u32,
    /// Human readable name
    pub name: String,
    /// Committed rate, percent of scheduler bandwidth
    pub min_bandwidth: u32,
    /// Peak rate, percent of scheduler bandwidth
    pub max_bandwidth: u32,
    /// Ingress policer capacity in bytes per second
    pub police_rate: u64,
    /// Maximum number of queued packets
    pub max_length: usize,
    /// Per-cycle packet quantum for deficit round robin
    pub priority: u32,
    /// Fill-level profile
    pub profile: Vec<ActionProfile>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            min_bandwidth: 0,
            max_bandwidth: 100,
            police_rate: 12_500_000,
            max_length: 1024,
            priority: 1,
            profile: Vec::new(),
        }
    }
}

impl QueueConfig {
    /// Check bounds of a single queue
    pub fn validate(&self) -> QosResult<()> {
        let invalid = |reason: String| QosError::InvalidQueue { id: self.id, reason };

        if self.max_length == 0 {
            return Err(invalid("max_length must be positive".into()));
        }
        if self.max_bandwidth > 100 {
            return Err(invalid(format!("max_bandwidth {} exceeds 100", self.max_bandwidth)));
        }
        if self.min_bandwidth > self.max_bandwidth {
            return Err(invalid(format!(
                "min_bandwidth {} above max_bandwidth {}",
                self.min_bandwidth, self.max_bandwidth
            )));
        }
        if self.police_rate == 0 {
            return Err(invalid("police_rate must be positive".into()));
        }
        for entry in &self.profile {
            if !(0.0..=1.0).contains(&entry.fill_level) {
                return Err(invalid(format!("fill level {} outside 0..=1", entry.fill_level)));
            }
            if entry.probability > 100 {
                return Err(invalid(format!("probability {} above 100", entry.probability)));
            }
        }
        Ok(())
    }
}

/// Classification rule in source form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Rule name
    pub name: String,
    /// Higher wins
    pub priority: i32,
    /// Source address (IA, ISD, AS or `lo||hi`)
    pub source: String,
    /// `EXACT`, `ISDONLY`, `ASONLY`, `RANGE` or `ANY`
    pub source_match_mode: String,
    /// Destination address
    pub destination: String,
    /// Destination match mode
    pub destination_match_mode: String,
    /// L4 protocols, empty matches any
    pub l4_types: Vec<String>,
    /// Restrict to packets arriving on this interface
    pub ingress_interface: Option<u64>,
    /// Target queue
    pub queue_number: u32,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            priority: 0,
            source: String::new(),
            source_match_mode: "ANY".into(),
            destination: String::new(),
            destination_match_mode: "ANY".into(),
            l4_types: Vec::new(),
            ingress_interface: None,
            queue_number: 0,
        }
    }
}

/// Dequeue discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    /// Drain every queue each cycle
    RoundRobin,
    /// Per-queue packet quantum, global rate gate with backpressure
    DeficitRoundRobin,
    /// CIR/PIR buckets with a shared surplus pool
    #[default]
    RateRoundRobin,
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Discipline to run
    pub discipline: Discipline,
    /// Aggregate egress rate in bytes per second
    pub bandwidth: u64,
    /// Packets dequeued per cycle across all queues (rate round robin)
    pub cycle_budget: usize,
    /// Packets popped per batch
    pub batch_size: usize,
    /// Per-cycle latency target
    pub cycle_period_ms: u64,
    /// Sleep between retries when the global bucket is empty (deficit round robin)
    pub backpressure_retry_ms: u64,
    /// Retries before forwarding anyway (deficit round robin)
    pub backpressure_max_retries: u32,
    /// Cap on the surplus pool; defaults to a tenth of `bandwidth`
    pub surplus_max_credit: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            discipline: Discipline::default(),
            bandwidth: 12_500_000,
            cycle_budget: 100,
            batch_size: 5,
            cycle_period_ms: 1,
            backpressure_retry_ms: 10,
            backpressure_max_retries: 20,
            surplus_max_credit: None,
        }
    }
}

impl SchedulerConfig {
    /// Effective surplus cap in bytes
    pub fn max_credit(&self) -> u64 {
        self.surplus_max_credit.unwrap_or(self.bandwidth / 10)
    }
}

/// Queue backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    /// Mutex-guarded ring buffer, never blocks
    #[default]
    Ring,
    /// Bounded channel, enqueue blocks when full
    Channel,
}

/// Engine (worker pool and channels) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Classification workers (capped at the queue count)
    pub workers: usize,
    /// Inbound packet channel capacity
    pub inbound_capacity: usize,
    /// Notification channel capacity
    pub notification_capacity: usize,
    /// Maximum classification cache entries, unbounded if unset
    pub cache_capacity: Option<usize>,
    /// Queue implementation
    pub queue_backend: QueueBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus(),
            inbound_capacity: 4096,
            notification_capacity: 1024,
            cache_capacity: None,
            queue_backend: QueueBackend::default(),
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Complete QoS configuration snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    /// Traffic class queues
    pub queues: Vec<QueueConfig>,
    /// Classification rules
    pub rules: Vec<RuleConfig>,
    /// Dequeue scheduler
    pub scheduler: SchedulerConfig,
    /// Worker pool and channels
    pub engine: EngineConfig,
}

impl QosConfig {
    /// Validate everything except rule predicate syntax
    pub fn validate(&self) -> QosResult<()> {
        if self.queues.is_empty() {
            return Err(QosError::NoQueues);
        }

        let mut ids = HashSet::with_capacity(self.queues.len());
        for queue in &self.queues {
            queue.validate()?;
            if !ids.insert(queue.id) {
                return Err(QosError::DuplicateQueue(queue.id));
            }
        }
        if !ids.contains(&0) {
            return Err(QosError::MissingDefaultQueue);
        }

        for rule in &self.rules {
            if !ids.contains(&rule.queue_number) {
                return Err(QosError::UnknownQueue {
                    rule: rule.name.clone(),
                    queue: rule.queue_number,
                });
            }
        }

        let sched = &self.scheduler;
        if sched.bandwidth == 0 {
            return Err(QosError::Config("scheduler bandwidth must be positive".into()));
        }
        if sched.batch_size == 0 || sched.cycle_budget == 0 {
            return Err(QosError::Config("batch_size and cycle_budget must be positive".into()));
        }
        if sched.cycle_period_ms == 0 {
            return Err(QosError::Config("cycle_period_ms must be positive".into()));
        }

        let engine = &self.engine;
        if engine.workers == 0 || engine.inbound_capacity == 0 || engine.notification_capacity == 0 {
            return Err(QosError::Config("workers and channel capacities must be positive".into()));
        }

        Ok(())
    }

    /// Queue ids in configuration order
    pub fn queue_ids(&self) -> Vec<u32> {
        self.queues.iter().map(|q| q.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QosConfig {
        QosConfig {
            queues: vec![
                QueueConfig { id: 0, name: "default".into(), ..Default::default() },
                QueueConfig { id: 1, name: "priority".into(), min_bandwidth: 30, max_bandwidth: 60, ..Default::default() },
            ],
            rules: vec![RuleConfig { name: "r1".into(), queue_number: 1, ..Default::default() }],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_rejects_missing_pieces() {
        let mut c = config();
        c.queues.clear();
        assert_eq!(c.validate(), Err(QosError::NoQueues));

        let mut c = config();
        c.queues[0].id = 2;
        assert_eq!(c.validate(), Err(QosError::MissingDefaultQueue));

        let mut c = config();
        c.queues[1].id = 0;
        assert_eq!(c.validate(), Err(QosError::DuplicateQueue(0)));

        let mut c = config();
        c.rules[0].queue_number = 7;
        assert!(matches!(c.validate(), Err(QosError::UnknownQueue { queue: 7, .. })));
    }

    #[test]
    fn test_rejects_bad_queue_bounds() {
        let mut c = config();
        c.queues[1].min_bandwidth = 70;
        assert!(matches!(c.validate(), Err(QosError::InvalidQueue { id: 1, .. })));

        let mut c = config();
        c.queues[1].profile.push(ActionProfile { fill_level: 1.5, probability: 10, action: Action::Drop });
        assert!(matches!(c.validate(), Err(QosError::InvalidQueue { id: 1, .. })));

        let mut c = config();
        c.queues[0].max_length = 0;
        assert!(matches!(c.validate(), Err(QosError::InvalidQueue { id: 0, .. })));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "queues": [
                {"id": 0, "max_length": 10,
                 "profile": [{"fill_level": 0.8, "probability": 100, "action": "DROP"}]}
            ],
            "rules": [
                {"name": "from-110", "priority": 1, "source": "1-ff00:0:110",
                 "source_match_mode": "EXACT", "queue_number": 0}
            ],
            "scheduler": {"discipline": "deficit_round_robin"}
        }"#;
        let c: QosConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.queues[0].max_length, 10);
        assert_eq!(c.queues[0].max_bandwidth, 100);
        assert_eq!(c.rules[0].destination_match_mode, "ANY");
        assert_eq!(c.scheduler.discipline, Discipline::DeficitRoundRobin);
        assert_eq!(c.scheduler.batch_size, 5);
        assert!(c.validate().is_ok());
    }
}
