//! Token bucket
//!
//! Single-owner rate limiter used as the per-queue ingress policer and for
//! the scheduler's CIR/PIR/global caps. Capacity doubles as the refill rate:
//! a bucket of capacity `c` earns `c` tokens per second.

use qos_common::Action;
use std::time::{Duration, Instant};

/// Refills closer together than this are deferred
pub const REFILL_GRANULARITY: Duration = Duration::from_millis(100);

/// Token bucket with debt support
///
/// `tokens` never exceeds `capacity` but may go negative after
/// [`TokenBucket::force_take`]; future refills repay the debt first.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: i64,
    tokens: i64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(capacity: u64) -> Self {
        let capacity = clamp_capacity(capacity);
        Self {
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Reset to a full bucket of the given capacity
    pub fn init(&mut self, capacity: u64) {
        *self = Self::new(capacity);
    }

    /// Refill based on wall-clock time
    #[inline]
    pub fn refill(&mut self) {
        self.refill_at(Instant::now());
    }

    /// Refill as if called at `now`
    ///
    /// Nothing happens until more than [`REFILL_GRANULARITY`] has passed since
    /// the last qualifying refill; the elapsed time keeps accumulating.
    pub fn refill_at(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed <= REFILL_GRANULARITY {
            return;
        }
        let elapsed_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        let earned = self.capacity.saturating_mul(elapsed_ms) / 1000;
        self.tokens = self.tokens.saturating_add(earned).min(self.capacity);
        self.last_refill = now;
    }

    /// Whether `n` tokens can be taken
    #[inline]
    pub fn available(&self, n: u64) -> bool {
        self.tokens >= clamp_capacity(n)
    }

    /// Take `n` tokens if available
    #[inline]
    pub fn take(&mut self, n: u64) -> bool {
        if !self.available(n) {
            return false;
        }
        self.tokens -= clamp_capacity(n);
        true
    }

    /// Take `n` tokens unconditionally, going into debt if needed
    #[inline]
    pub fn force_take(&mut self, n: u64) {
        self.tokens = self.tokens.saturating_sub(clamp_capacity(n));
    }

    /// Return tokens, bounded by capacity
    #[inline]
    pub fn refund(&mut self, n: u64) {
        self.tokens = self.tokens.saturating_add(clamp_capacity(n)).min(self.capacity);
    }

    /// Ingress policing decision for one packet
    #[inline]
    pub fn police(&mut self, packet_len: usize) -> Action {
        self.police_at(packet_len, Instant::now())
    }

    /// Policing decision as if called at `now`
    ///
    /// Passes only while the balance is strictly above the packet size.
    pub fn police_at(&mut self, packet_len: usize, now: Instant) -> Action {
        self.refill_at(now);
        let len = i64::try_from(packet_len).unwrap_or(i64::MAX);
        if self.tokens > len {
            self.tokens -= len;
            Action::Pass
        } else {
            Action::Drop
        }
    }

    /// Current balance (negative while in debt)
    #[inline]
    pub fn tokens(&self) -> i64 {
        self.tokens
    }

    /// Capacity in tokens
    #[inline]
    pub fn capacity(&self) -> i64 {
        self.capacity
    }
}

#[inline]
fn clamp_capacity(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
