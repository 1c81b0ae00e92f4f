//! Tiered rule index
//!
//! Built once per rule set and never mutated afterwards. Every list holds
//! positions into the rule slice, so two lists can be intersected by
//! comparing positions.

use crate::rule::{ClassRule, MatchSpec};
use qos_common::{Asn, Isd, IA};
use std::collections::HashMap;
use std::sync::Arc;

/// Position of a rule in its rule set
pub type RuleId = usize;

/// Per-tier candidates for one address
#[derive(Debug, Default)]
pub struct TierHits {
    /// Exact and range matches
    pub exact: Vec<RuleId>,
    /// AS-only matches
    pub asn: Vec<RuleId>,
    /// ISD-only matches
    pub isd: Vec<RuleId>,
}

impl TierHits {
    fn clear(&mut self) {
        self.exact.clear();
        self.asn.clear();
        self.isd.clear();
    }

    /// All tiers in scan order
    pub fn iter(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.exact.iter().chain(self.asn.iter()).chain(self.isd.iter()).copied()
    }

    /// Total hits across tiers
    pub fn len(&self) -> usize {
        self.exact.len() + self.asn.len() + self.isd.len()
    }

    /// No hits in any tier
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lookup tables for one address predicate, keyed by specificity tier
#[derive(Debug, Default)]
pub struct SideIndex {
    exact: HashMap<IA, Vec<RuleId>>,
    ranges: Vec<(MatchSpec, RuleId)>,
    asn: HashMap<Asn, Vec<RuleId>>,
    isd: HashMap<Isd, Vec<RuleId>>,
}

impl SideIndex {
    fn insert(&mut self, spec: &MatchSpec, id: RuleId) {
        match *spec {
            MatchSpec::Exact(ia) => self.exact.entry(ia).or_default().push(id),
            MatchSpec::Range(..) => self.ranges.push((*spec, id)),
            MatchSpec::AsOnly(asn) => self.asn.entry(asn).or_default().push(id),
            MatchSpec::IsdOnly(isd) => self.isd.entry(isd).or_default().push(id),
            // Wildcard sides are routed to the one-sided indexes by the caller
            MatchSpec::Any => {}
        }
    }

    /// Collect every rule whose predicate on this side accepts `ia`
    pub fn collect(&self, ia: IA, hits: &mut TierHits) {
        hits.clear();
        if let Some(ids) = self.exact.get(&ia) {
            hits.exact.extend_from_slice(ids);
        }
        for (spec, id) in &self.ranges {
            if spec.matches(ia) {
                hits.exact.push(*id);
            }
        }
        if let Some(ids) = self.asn.get(&ia.asn) {
            hits.asn.extend_from_slice(ids);
        }
        if let Some(ids) = self.isd.get(&ia.isd) {
            hits.isd.extend_from_slice(ids);
        }
    }

    /// Number of indexed rules
    pub fn len(&self) -> usize {
        self.exact.values().map(Vec::len).sum::<usize>()
            + self.ranges.len()
            + self.asn.values().map(Vec::len).sum::<usize>()
            + self.isd.values().map(Vec::len).sum::<usize>()
    }

    /// Nothing indexed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable multi-tier index over a rule slice
#[derive(Debug, Default)]
pub struct RuleIndex {
    /// Source side of rules with both predicates set
    pub source: SideIndex,
    /// Destination side of rules with both predicates set
    pub destination: SideIndex,
    /// Rules whose destination is `Any`, keyed by source
    pub source_only: SideIndex,
    /// Rules whose source is `Any`, keyed by destination
    pub destination_only: SideIndex,
    /// Rules bound to an ingress interface
    pub interfaces: HashMap<u64, Vec<RuleId>>,
    /// Rules with both sides `Any`; only L4 type decides
    pub l4_only: Vec<RuleId>,
    /// At least one rule restricts L4 types
    pub l4_restricted: bool,
}

impl RuleIndex {
    /// Index a rule slice
    pub fn build(rules: &[Arc<ClassRule>]) -> Self {
        let mut index = RuleIndex::default();

        for (id, rule) in rules.iter().enumerate() {
            index.l4_restricted |= !rule.l4_types.is_empty();

            if let Some(interface) = rule.ingress_interface {
                index.interfaces.entry(interface).or_default().push(id);
                continue;
            }

            match (rule.source.is_any(), rule.destination.is_any()) {
                (true, true) => index.l4_only.push(id),
                (false, true) => index.source_only.insert(&rule.source, id),
                (true, false) => index.destination_only.insert(&rule.destination, id),
                (false, false) => {
                    index.source.insert(&rule.source, id);
                    index.destination.insert(&rule.destination, id);
                }
            }
        }

        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ia(s: &str) -> IA {
        s.parse().unwrap()
    }

    fn rules() -> Vec<Arc<ClassRule>> {
        vec![
            ClassRule::new("both", 1, MatchSpec::Exact(ia("1-ff00:0:110")), MatchSpec::IsdOnly(Isd(2)), 1),
            ClassRule::new("src-only", 1, MatchSpec::AsOnly(Asn(0xff00_0000_0110)), MatchSpec::Any, 1),
            ClassRule::new("dst-only", 1, MatchSpec::Any, MatchSpec::Range(ia("2-1"), ia("2-9")), 1),
            ClassRule::new("any", 1, MatchSpec::Any, MatchSpec::Any, 1),
            ClassRule::new("intf", 1, MatchSpec::Any, MatchSpec::Any, 1).with_ingress(3),
        ]
        .into_iter()
        .map(Arc::new)
        .collect()
    }

    #[test]
    fn test_rules_land_in_their_tiers() {
        let index = RuleIndex::build(&rules());
        assert_eq!(index.source.len(), 1);
        assert_eq!(index.destination.len(), 1);
        assert_eq!(index.source_only.len(), 1);
        assert_eq!(index.destination_only.len(), 1);
        assert_eq!(index.l4_only, vec![3]);
        assert_eq!(index.interfaces.get(&3), Some(&vec![4]));
        assert!(!index.l4_restricted);
    }

    #[test]
    fn test_collect_by_tier() {
        let index = RuleIndex::build(&rules());
        let mut hits = TierHits::default();

        index.source_only.collect(ia("7-ff00:0:110"), &mut hits);
        assert_eq!(hits.asn, vec![1]);
        assert!(hits.exact.is_empty());

        index.destination_only.collect(ia("2-1"), &mut hits);
        assert_eq!(hits.exact, vec![2]);
        index.destination_only.collect(ia("2-9"), &mut hits);
        assert_eq!(hits.exact, vec![2]);
        index.destination_only.collect(ia("2-0"), &mut hits);
        assert!(hits.is_empty());
        index.destination_only.collect(ia("2-10"), &mut hits);
        assert!(hits.is_empty());

        index.destination.collect(ia("2-10"), &mut hits);
        assert_eq!(hits.isd, vec![0]);
    }
}
