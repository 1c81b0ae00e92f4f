//! Rule set snapshots and the classifier that publishes them

use crate::cache::{CacheKey, ClassificationCache};
use crate::index::{RuleId, RuleIndex, TierHits};
use crate::rule::ClassRule;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use qos_common::{PacketHeader, QosResult, RuleConfig};
use serde::Serialize;
use std::sync::Arc;

/// One published generation of rules: the rules, their index and the cache
/// of resolutions made against them.
pub struct RuleSet {
    version: u64,
    rules: Vec<Arc<ClassRule>>,
    index: RuleIndex,
    cache: ClassificationCache,
    default_rule: Arc<ClassRule>,
}

impl RuleSet {
    /// Parse and index rules in source form
    pub fn build(configs: &[RuleConfig], version: u64, cache_capacity: Option<usize>) -> QosResult<Self> {
        let rules = configs
            .iter()
            .map(ClassRule::try_from)
            .collect::<QosResult<Vec<_>>>()?;
        Ok(Self::from_rules(rules, version, cache_capacity))
    }

    /// Index already-constructed rules
    pub fn from_rules(rules: Vec<ClassRule>, version: u64, cache_capacity: Option<usize>) -> Self {
        let rules: Vec<Arc<ClassRule>> = rules.into_iter().map(Arc::new).collect();
        let index = RuleIndex::build(&rules);
        Self {
            version,
            rules,
            index,
            cache: ClassificationCache::new(cache_capacity),
            default_rule: Arc::new(ClassRule::default_rule()),
        }
    }

    /// Resolve a packet to its winning rule. Never fails.
    pub fn resolve(&self, header: &PacketHeader) -> Arc<ClassRule> {
        // Extension headers can admit extra rules the key does not capture
        let cacheable = header.extensions.is_empty() || !self.index.l4_restricted;
        let key = CacheKey::from(header);

        if cacheable {
            if let Some(rule) = self.cache.get(&key) {
                if rule.matches_l4(header.l4, &header.extensions) {
                    return rule;
                }
                self.cache.discard(&key);
            }
        }

        let rule = match self.find_best(header) {
            Some(id) => Arc::clone(&self.rules[id]),
            None => Arc::clone(&self.default_rule),
        };

        if cacheable {
            self.cache.insert(key, Arc::clone(&rule));
        }
        tracing::trace!(src = %header.src, dst = %header.dst, rule = %rule.name, "classified");
        rule
    }

    /// Full index scan, no cache
    pub fn find_best(&self, header: &PacketHeader) -> Option<RuleId> {
        let index = &self.index;
        let l4 = header.l4;
        let ext = header.extensions.as_slice();

        let mut best: Option<RuleId> = None;
        let mut consider = |id: RuleId| {
            if !self.rules[id].matches_l4(l4, ext) {
                return;
            }
            best = match best {
                Some(current) if !self.outranks(id, current) => Some(current),
                _ => Some(id),
            };
        };

        // Two-sided rules: present in some source tier and some destination tier
        let mut src_hits = TierHits::default();
        let mut dst_hits = TierHits::default();
        index.source.collect(header.src, &mut src_hits);
        if !src_hits.is_empty() {
            index.destination.collect(header.dst, &mut dst_hits);
            let mut dst_ids: Vec<RuleId> = dst_hits.iter().collect();
            dst_ids.sort_unstable();
            for id in src_hits.iter() {
                if dst_ids.binary_search(&id).is_ok() {
                    consider(id);
                }
            }
        }

        // One-sided rules
        index.source_only.collect(header.src, &mut src_hits);
        src_hits.iter().for_each(&mut consider);
        index.destination_only.collect(header.dst, &mut dst_hits);
        dst_hits.iter().for_each(&mut consider);

        if let Some(ids) = index.interfaces.get(&header.ingress) {
            for &id in ids {
                if self.rules[id].matches_addresses(header.src, header.dst) {
                    consider(id);
                }
            }
        }

        index.l4_only.iter().copied().for_each(&mut consider);

        best
    }

    /// Strictly higher priority wins; ties go to the rule listed first
    #[inline]
    fn outranks(&self, a: RuleId, b: RuleId) -> bool {
        let (pa, pb) = (self.rules[a].priority, self.rules[b].priority);
        pa > pb || (pa == pb && a < b)
    }

    /// Generation number
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Rules in configuration order
    pub fn rules(&self) -> &[Arc<ClassRule>] {
        &self.rules
    }

    /// Rule index
    pub fn index(&self) -> &RuleIndex {
        &self.index
    }

    /// Resolution cache
    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    /// Counters for this generation
    pub fn stats(&self) -> ClassifierStats {
        let (hits, misses, stale) = self.cache.counters();
        ClassifierStats {
            version: self.version,
            rules: self.rules.len(),
            cache_entries: self.cache.len(),
            cache_hits: hits,
            cache_misses: misses,
            cache_stale: stale,
        }
    }
}

/// Classifier with atomically swappable rule sets
///
/// Readers load the current [`RuleSet`] without locking; a reload builds the
/// next generation off to the side and publishes it in one store. Versions
/// are handed out at publish time, so a rejected build leaves no gap.
pub struct Classifier {
    current: ArcSwap<RuleSet>,
    next_version: Mutex<u64>,
    cache_capacity: Option<usize>,
}

impl Classifier {
    /// Build the initial rule set
    pub fn new(rules: &[RuleConfig], cache_capacity: Option<usize>) -> QosResult<Self> {
        let set = RuleSet::build(rules, 1, cache_capacity)?;
        Ok(Self {
            current: ArcSwap::from_pointee(set),
            next_version: Mutex::new(2),
            cache_capacity,
        })
    }

    /// Resolve a packet against the current rule set
    #[inline]
    pub fn resolve(&self, header: &PacketHeader) -> Arc<ClassRule> {
        self.current.load().resolve(header)
    }

    /// Replace the rule set. On error the running set stays in place.
    pub fn reload(&self, rules: &[RuleConfig]) -> QosResult<u64> {
        let set = self.build(rules)?;
        Ok(self.publish(set).version())
    }

    /// Parse and index the next generation without publishing it
    ///
    /// The result carries no version until [`Classifier::publish`].
    pub fn build(&self, rules: &[RuleConfig]) -> QosResult<RuleSet> {
        RuleSet::build(rules, 0, self.cache_capacity).map_err(|e| {
            tracing::warn!(error = %e, "rejected rule reload");
            e
        })
    }

    /// Stamp `set` with the next version and make it current
    pub fn publish(&self, mut set: RuleSet) -> Arc<RuleSet> {
        let mut next = self.next_version.lock();
        set.version = *next;
        *next += 1;

        let set = Arc::new(set);
        self.current.store(Arc::clone(&set));
        tracing::info!(version = set.version, rules = set.rules.len(), "rule set reloaded");
        set
    }

    /// Current rule set
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.current.load_full()
    }

    /// Classifier statistics
    pub fn stats(&self) -> ClassifierStats {
        self.current.load().stats()
    }
}

/// Classifier statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassifierStats {
    /// Version of the current rule set
    pub version: u64,
    /// Rules in the current rule set
    pub rules: usize,
    /// Cached resolutions
    pub cache_entries: usize,
    /// Lookups answered from the cache
    pub cache_hits: u64,
    /// Lookups that fell through to the index
    pub cache_misses: u64,
    /// Cache hits discarded after failing the L4 re-check
    pub cache_stale: u64,
}
