//! Shared pool of unused committed-rate capacity

/// Credit bank redistributing unspent CIR to queues bursting toward PIR
///
/// A queue pays in what it left unspent at the end of its turn and gets its
/// last payment back (if still in the pool) at the start of its next turn.
/// Whatever another queue consumed in between is gone for good, so the pool
/// never lends more than was actually left idle.
#[derive(Debug, Clone)]
pub struct SurplusPool {
    credit: i64,
    max_credit: i64,
    last_payment: Vec<i64>,
}

impl SurplusPool {
    /// Empty pool for `queues` contributors
    pub fn new(max_credit: u64, queues: usize) -> Self {
        Self {
            credit: 0,
            max_credit: i64::try_from(max_credit).unwrap_or(i64::MAX),
            last_payment: vec![0; queues],
        }
    }

    /// Whether `n` bytes of surplus can be drawn
    #[inline]
    pub fn available(&self, n: u64) -> bool {
        self.credit >= to_i64(n)
    }

    /// Draw `n` bytes if available
    pub fn take(&mut self, n: u64) -> bool {
        if !self.available(n) {
            return false;
        }
        self.credit -= to_i64(n);
        true
    }

    /// Pay up to `amount` on behalf of `queue`; returns the accepted amount
    pub fn pay(&mut self, queue: usize, amount: u64) -> u64 {
        let room = (self.max_credit - self.credit).max(0);
        let accepted = to_i64(amount).min(room);
        self.credit += accepted;
        if let Some(slot) = self.last_payment.get_mut(queue) {
            *slot = accepted;
        }
        accepted as u64
    }

    /// Reclaim what `queue` paid last time, as far as it is still unspent
    pub fn withdraw(&mut self, queue: usize) -> u64 {
        let Some(slot) = self.last_payment.get_mut(queue) else {
            return 0;
        };
        let reclaimed = (*slot).min(self.credit).max(0);
        *slot = 0;
        self.credit -= reclaimed;
        reclaimed as u64
    }

    /// Current balance
    #[inline]
    pub fn credit(&self) -> i64 {
        self.credit
    }

    /// Balance cap
    #[inline]
    pub fn max_credit(&self) -> i64 {
        self.max_credit
    }
}

#[inline]
fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pay_is_capped() {
        let mut pool = SurplusPool::new(1000, 2);
        assert_eq!(pool.pay(0, 700), 700);
        assert_eq!(pool.pay(1, 700), 300);
        assert_eq!(pool.credit(), 1000);
        assert_eq!(pool.pay(1, 1), 0);
    }

    #[test]
    fn test_withdraw_returns_only_what_is_left() {
        let mut pool = SurplusPool::new(1000, 2);
        pool.pay(0, 600);
        assert!(pool.take(400));
        assert_eq!(pool.withdraw(0), 200);
        assert_eq!(pool.credit(), 0);
        // second withdraw has nothing recorded
        assert_eq!(pool.withdraw(0), 0);
    }

    #[test]
    fn test_take_requires_full_amount() {
        let mut pool = SurplusPool::new(100, 1);
        pool.pay(0, 50);
        assert!(!pool.available(51));
        assert!(!pool.take(51));
        assert!(pool.take(50));
        assert_eq!(pool.credit(), 0);
    }

    #[test]
    fn test_unknown_queue_index() {
        let mut pool = SurplusPool::new(100, 1);
        assert_eq!(pool.pay(5, 10), 10);
        assert_eq!(pool.withdraw(5), 0);
    }

    proptest! {
        #[test]
        fn credit_stays_within_bounds(
            max in 0u64..10_000,
            ops in proptest::collection::vec((0u8..3, 0usize..3, 0u64..5_000), 1..60),
        ) {
            let mut pool = SurplusPool::new(max, 3);
            for (op, queue, amount) in ops {
                match op {
                    0 => { pool.pay(queue, amount); }
                    1 => { pool.withdraw(queue); }
                    _ => { pool.take(amount); }
                }
                prop_assert!(pool.credit() >= 0);
                prop_assert!(pool.credit() <= pool.max_credit());
            }
        }
    }
}
