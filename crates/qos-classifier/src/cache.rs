//! Concurrent classification cache
//!
//! Maps a lookup key to the rule that won for it. Entries are advisory: the
//! caller re-validates a hit before trusting it. There is no eviction; a
//! reload replaces the whole cache together with the rule set.

use crate::rule::ClassRule;
use dashmap::DashMap;
use qos_common::{AtomicCounter, L4Type, PacketHeader, IA};
use std::sync::Arc;

/// Cache lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Source IA
    pub src: IA,
    /// Destination IA
    pub dst: IA,
    /// Ingress interface
    pub ingress: u64,
    /// L4 type
    pub l4: L4Type,
}

impl From<&PacketHeader> for CacheKey {
    #[inline(always)]
    fn from(header: &PacketHeader) -> Self {
        Self {
            src: header.src,
            dst: header.dst,
            ingress: header.ingress,
            l4: header.l4,
        }
    }
}

/// Classification cache backed by a sharded concurrent map
pub struct ClassificationCache {
    entries: DashMap<CacheKey, Arc<ClassRule>>,
    capacity: Option<usize>,
    hits: AtomicCounter,
    misses: AtomicCounter,
    stale: AtomicCounter,
}

impl ClassificationCache {
    /// Create cache; `None` means unbounded
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            hits: AtomicCounter::new(0),
            misses: AtomicCounter::new(0),
            stale: AtomicCounter::new(0),
        }
    }

    /// Get cached rule
    #[inline]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<ClassRule>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.inc();
                Some(Arc::clone(entry.value()))
            }
            None => {
                self.misses.inc();
                None
            }
        }
    }

    /// Insert rule; silently skipped once the capacity is reached
    #[inline]
    pub fn insert(&self, key: CacheKey, rule: Arc<ClassRule>) {
        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity && !self.entries.contains_key(&key) {
                return;
            }
        }
        self.entries.insert(key, rule);
    }

    /// Drop an entry that failed validation
    pub fn discard(&self, key: &CacheKey) {
        self.stale.inc();
        self.entries.remove(key);
    }

    /// Current number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear cache
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// (hits, misses, stale) counters
    pub fn counters(&self) -> (u64, u64, u64) {
        (self.hits.get(), self.misses.get(), self.stale.get())
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::MatchSpec;

    fn key(n: u64) -> CacheKey {
        CacheKey { src: IA::new(1, n), dst: IA::new(2, n), ingress: 1, l4: L4Type::UDP }
    }

    #[test]
    fn test_cache_hit_and_discard() {
        let cache = ClassificationCache::default();
        let rule = Arc::new(ClassRule::new("r", 1, MatchSpec::Any, MatchSpec::Any, 1));

        assert!(cache.get(&key(1)).is_none());
        cache.insert(key(1), rule.clone());
        assert_eq!(cache.get(&key(1)).unwrap().name, "r");

        cache.discard(&key(1));
        assert!(cache.get(&key(1)).is_none());
        assert_eq!(cache.counters(), (1, 2, 1));
    }

    #[test]
    fn test_capacity_bound() {
        let cache = ClassificationCache::new(Some(2));
        let rule = Arc::new(ClassRule::default_rule());
        for n in 0..5 {
            cache.insert(key(n), rule.clone());
        }
        assert_eq!(cache.len(), 2);

        // existing keys can still be refreshed
        cache.insert(key(0), rule);
        assert_eq!(cache.len(), 2);
    }
}
