//! Per-class packet queues
//!
//! Every backend satisfies the same contract: FIFO per queue, non-blocking
//! pops that return nothing when empty, and a fill-level profile plus an
//! ingress policer shared through [`QueueState`].
//!
//! | Backend | Enqueue when full | Soft limit enforced by |
//! |---------|-------------------|------------------------|
//! | [`RingQueue`] | accepts | engine (`QueueFull` check) |
//! | [`ChannelQueue`] | blocks the caller | channel capacity |

mod channel;
mod ring;

pub use channel::ChannelQueue;
pub use ring::RingQueue;

use crate::bucket::TokenBucket;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use qos_common::{Action, Packet, QueueBackend, QueueConfig};
use rand::Rng;
use std::sync::Arc;

/// Classified, policed packet waiting in a queue
#[derive(Debug, Clone)]
pub struct QPkt {
    /// Queue the packet was assigned to
    pub queue: u32,
    /// Policing outcome
    pub action: Action,
    /// Packet handle
    pub packet: Packet,
}

/// Packet queue abstraction
pub trait PacketQueue: Send + Sync {
    /// Append a packet
    fn enqueue(&self, pkt: QPkt);

    /// Remove the oldest packet, `None` when empty
    fn pop(&self) -> Option<QPkt>;

    /// Remove up to `n` oldest packets
    fn pop_multiple(&self, n: usize) -> Vec<QPkt>;

    /// Packets currently queued
    fn len(&self) -> usize;

    /// Whether `enqueue` blocks when the queue is full
    fn blocks_when_full(&self) -> bool;

    /// Configuration and policer
    fn state(&self) -> &QueueState;

    /// Check if empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue id
    fn id(&self) -> u32 {
        self.state().config().id
    }

    /// Occupancy as a fraction of `max_length`
    fn fill_level(&self) -> f64 {
        self.len() as f64 / self.state().config().max_length.max(1) as f64
    }

    /// Probabilistic fill-level decision
    fn check_action(&self) -> Action {
        self.state().check_action(self.fill_level(), &mut rand::thread_rng())
    }

    /// Ingress policing keyed on packet length
    fn police(&self, packet: &Packet) -> Action {
        self.state().police(packet.len())
    }
}

/// Ingress bucket and the rate it was built for
struct Policer {
    rate: u64,
    bucket: TokenBucket,
}

/// Configuration and policer shared by every backend
pub struct QueueState {
    config: ArcSwap<QueueConfig>,
    policer: Mutex<Policer>,
}

impl QueueState {
    /// Create from config; the profile is ordered by descending fill level
    pub fn new(config: QueueConfig) -> Self {
        let policer = Policer {
            rate: config.police_rate,
            bucket: TokenBucket::new(config.police_rate),
        };
        Self {
            config: ArcSwap::from_pointee(normalize(config)),
            policer: Mutex::new(policer),
        }
    }

    /// Current configuration
    #[inline]
    pub fn config(&self) -> Arc<QueueConfig> {
        self.config.load_full()
    }

    /// Swap in a new configuration
    ///
    /// The policer is rebuilt on its next use, and only if its rate changed.
    pub fn reconfigure(&self, config: QueueConfig) {
        self.replace(Arc::new(normalize(config)));
    }

    /// Swap in an already normalized configuration
    pub(crate) fn replace(&self, config: Arc<QueueConfig>) {
        self.config.store(config);
    }

    /// Fill-level decision against the current configuration
    pub fn check_action<R: Rng>(&self, fill_level: f64, rng: &mut R) -> Action {
        profile_action(&self.config.load(), fill_level, rng)
    }

    /// Police `len` bytes at the current configuration's rate
    #[inline]
    pub fn police(&self, len: usize) -> Action {
        let rate = self.config.load().police_rate;
        self.police_at_rate(rate, len)
    }

    /// Police `len` bytes at `rate`, rebuilding the bucket if the rate moved
    pub fn police_at_rate(&self, rate: u64, len: usize) -> Action {
        let mut policer = self.policer.lock();
        if policer.rate != rate {
            tracing::debug!(from = policer.rate, to = rate, "policer rebuilt");
            policer.rate = rate;
            policer.bucket.init(rate);
        }
        policer.bucket.police(len)
    }
}

/// Scan the profile from the highest threshold down; the first entry at or
/// below `fill_level` is the candidate and a trial with its probability
/// decides whether its action applies.
///
/// Expects the profile ordered by descending fill level, as [`QueueState`]
/// stores it.
pub fn profile_action<R: Rng>(config: &QueueConfig, fill_level: f64, rng: &mut R) -> Action {
    let candidate = config.profile.iter().find(|entry| entry.fill_level <= fill_level);
    match candidate {
        Some(entry) if rng.gen_range(0..100u8) < entry.probability => entry.action,
        _ => Action::Pass,
    }
}

/// Order the profile by descending fill level
pub(crate) fn normalize(mut config: QueueConfig) -> QueueConfig {
    config
        .profile
        .sort_by(|a, b| b.fill_level.total_cmp(&a.fill_level));
    config
}

/// Construct a queue with the configured backend
pub fn build_queue(backend: QueueBackend, config: QueueConfig) -> Arc<dyn PacketQueue> {
    match backend {
        QueueBackend::Ring => Arc::new(RingQueue::new(config)),
        QueueBackend::Channel => Arc::new(ChannelQueue::new(config)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::Bytes;
    use qos_common::{ActionProfile, PacketHeader};

    pub(crate) fn qpkt(queue: u32, len: usize) -> QPkt {
        QPkt {
            queue,
            action: Action::Pass,
            packet: Packet::new(PacketHeader::default(), Bytes::from(vec![0u8; len])),
        }
    }

    fn profile(entries: &[(f64, u8, Action)]) -> QueueConfig {
        QueueConfig {
            max_length: 10,
            profile: entries
                .iter()
                .map(|&(fill_level, probability, action)| ActionProfile { fill_level, probability, action })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_profile_picks_highest_reached_threshold() {
        let state = QueueState::new(profile(&[
            (0.5, 100, Action::Notify),
            (0.9, 100, Action::DropNotify),
            (0.7, 100, Action::Drop),
        ]));
        let mut rng = rand::thread_rng();
        assert_eq!(state.check_action(0.2, &mut rng), Action::Pass);
        assert_eq!(state.check_action(0.5, &mut rng), Action::Notify);
        assert_eq!(state.check_action(0.8, &mut rng), Action::Drop);
        assert_eq!(state.check_action(1.0, &mut rng), Action::DropNotify);
    }

    #[test]
    fn test_failed_trial_passes() {
        let state = QueueState::new(profile(&[(0.0, 100, Action::Drop), (0.5, 0, Action::Notify)]));
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            // the 0.5 entry is the candidate and never wins its trial
            assert_eq!(state.check_action(0.9, &mut rng), Action::Pass);
            assert_eq!(state.check_action(0.1, &mut rng), Action::Drop);
        }
    }

    #[test]
    fn test_reconfigure_resets_policer_on_rate_change() {
        let state = QueueState::new(QueueConfig { police_rate: 1000, ..Default::default() });
        assert_eq!(state.police(900), Action::Pass);
        assert_eq!(state.police(900), Action::Drop);

        state.reconfigure(QueueConfig { police_rate: 1000, max_length: 5, ..Default::default() });
        assert_eq!(state.config().max_length, 5);
        assert_eq!(state.police(900), Action::Drop);

        state.reconfigure(QueueConfig { police_rate: 5000, ..Default::default() });
        assert_eq!(state.police(900), Action::Pass);
    }

    #[test]
    fn test_police_at_rate_keeps_bucket_while_rate_holds() {
        let state = QueueState::new(QueueConfig { police_rate: 1000, ..Default::default() });
        assert_eq!(state.police_at_rate(1000, 900), Action::Pass);
        assert_eq!(state.police_at_rate(1000, 900), Action::Drop);
        assert_eq!(state.police_at_rate(2000, 900), Action::Pass);
        assert_eq!(state.police_at_rate(2000, 900), Action::Pass);
        assert_eq!(state.police_at_rate(2000, 900), Action::Drop);
    }

    #[test]
    fn test_profile_action_reads_given_config() {
        let config = normalize(profile(&[(0.5, 100, Action::Notify), (0.9, 100, Action::Drop)]));
        let mut rng = rand::thread_rng();
        assert_eq!(profile_action(&config, 0.95, &mut rng), Action::Drop);
        assert_eq!(profile_action(&config, 0.6, &mut rng), Action::Notify);
        assert_eq!(profile_action(&QueueConfig::default(), 1.0, &mut rng), Action::Pass);
    }

    #[test]
    fn test_build_queue_backends() {
        for backend in [QueueBackend::Ring, QueueBackend::Channel] {
            let queue = build_queue(backend, QueueConfig { id: 3, max_length: 4, ..Default::default() });
            assert_eq!(queue.id(), 3);
            queue.enqueue(qpkt(3, 10));
            queue.enqueue(qpkt(3, 20));
            assert_eq!(queue.fill_level(), 0.5);
            assert_eq!(queue.pop().unwrap().packet.len(), 10);
            assert_eq!(queue.pop_multiple(5).len(), 1);
            assert!(queue.pop().is_none());
            assert!(queue.is_empty());
        }
    }
}
