//! Classification rules and address predicates

use qos_common::{Asn, Isd, L4Type, PacketHeader, QosError, QosResult, RuleConfig, IA};
use serde::Serialize;
use std::fmt;

/// Separator between the bounds of a range address
pub const RANGE_SEPARATOR: &str = "||";

/// Address predicate for one side of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MatchSpec {
    /// Exactly this IA
    Exact(IA),
    /// Any AS in this ISD
    IsdOnly(Isd),
    /// This AS number in any ISD
    AsOnly(Asn),
    /// Inclusive IA range under (ISD, AS) ordering
    Range(IA, IA),
    /// Matches everything
    Any,
}

impl MatchSpec {
    /// Parse a predicate from its match mode and address strings
    pub fn parse(mode: &str, address: &str) -> QosResult<Self> {
        match mode.trim().to_ascii_uppercase().as_str() {
            "EXACT" => Ok(MatchSpec::Exact(address.parse()?)),
            "ISDONLY" => {
                let isd = match address.split_once('-') {
                    Some((isd, _)) => isd.parse()?,
                    None => address.parse()?,
                };
                Ok(MatchSpec::IsdOnly(isd))
            }
            "ASONLY" => {
                let asn = match address.split_once('-') {
                    Some((_, asn)) => asn.parse()?,
                    None => address.parse()?,
                };
                Ok(MatchSpec::AsOnly(asn))
            }
            "RANGE" => {
                let (lo, hi) = address.split_once(RANGE_SEPARATOR).ok_or_else(|| {
                    QosError::InvalidRange(format!("{:?} is not <lo>{}<hi>", address, RANGE_SEPARATOR))
                })?;
                let lo: IA = lo.parse()?;
                let hi: IA = hi.parse()?;
                if lo > hi {
                    return Err(QosError::InvalidRange(format!("{} is above {}", lo, hi)));
                }
                Ok(MatchSpec::Range(lo, hi))
            }
            "ANY" => Ok(MatchSpec::Any),
            other => Err(QosError::InvalidMatchMode(other.to_string())),
        }
    }

    /// Check whether `ia` satisfies the predicate
    #[inline]
    pub fn matches(&self, ia: IA) -> bool {
        match *self {
            MatchSpec::Exact(exact) => ia == exact,
            MatchSpec::IsdOnly(isd) => ia.isd == isd,
            MatchSpec::AsOnly(asn) => ia.asn == asn,
            MatchSpec::Range(lo, hi) => lo <= ia && ia <= hi,
            MatchSpec::Any => true,
        }
    }

    /// Whether this is the wildcard
    #[inline]
    pub fn is_any(&self) -> bool {
        matches!(self, MatchSpec::Any)
    }
}

impl fmt::Display for MatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchSpec::Exact(ia) => write!(f, "{}", ia),
            MatchSpec::IsdOnly(isd) => write!(f, "{}-*", isd),
            MatchSpec::AsOnly(asn) => write!(f, "*-{}", asn),
            MatchSpec::Range(lo, hi) => write!(f, "{}{}{}", lo, RANGE_SEPARATOR, hi),
            MatchSpec::Any => f.write_str("*"),
        }
    }
}

/// Immutable classification rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassRule {
    /// Rule name
    pub name: String,
    /// Higher wins
    pub priority: i32,
    /// Source predicate
    pub source: MatchSpec,
    /// Destination predicate
    pub destination: MatchSpec,
    /// Accepted L4 types, empty accepts any (sorted, deduplicated)
    pub l4_types: Vec<L4Type>,
    /// Only packets arriving on this interface
    pub ingress_interface: Option<u64>,
    /// Queue the packet is assigned to
    pub queue_number: u32,
}

impl ClassRule {
    /// Build a rule; L4 types are normalized
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        source: MatchSpec,
        destination: MatchSpec,
        queue_number: u32,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            source,
            destination,
            l4_types: Vec::new(),
            ingress_interface: None,
            queue_number,
        }
    }

    /// Restrict to L4 types
    pub fn with_l4(mut self, types: impl IntoIterator<Item = L4Type>) -> Self {
        self.l4_types.extend(types);
        self.l4_types.sort_unstable();
        self.l4_types.dedup();
        self
    }

    /// Restrict to an ingress interface
    pub fn with_ingress(mut self, interface: u64) -> Self {
        self.ingress_interface = Some(interface);
        self
    }

    /// Catch-all rule used when nothing matches
    pub fn default_rule() -> Self {
        Self::new("default", 0, MatchSpec::Any, MatchSpec::Any, 0)
    }

    /// L4 compatibility against the packet's protocol and extension headers
    #[inline]
    pub fn matches_l4(&self, l4: L4Type, extensions: &[L4Type]) -> bool {
        if self.l4_types.is_empty() {
            return true;
        }
        self.l4_types.binary_search(&l4).is_ok()
            || extensions.iter().any(|ext| self.l4_types.binary_search(ext).is_ok())
    }

    /// Source and destination predicates
    #[inline]
    pub fn matches_addresses(&self, src: IA, dst: IA) -> bool {
        self.source.matches(src) && self.destination.matches(dst)
    }

    /// Full predicate, as the index would evaluate it
    pub fn matches(&self, header: &PacketHeader) -> bool {
        if let Some(interface) = self.ingress_interface {
            if interface != header.ingress {
                return false;
            }
        }
        self.matches_addresses(header.src, header.dst) && self.matches_l4(header.l4, &header.extensions)
    }
}

impl TryFrom<&RuleConfig> for ClassRule {
    type Error = QosError;

    fn try_from(config: &RuleConfig) -> Result<Self, Self::Error> {
        let source = MatchSpec::parse(&config.source_match_mode, &config.source)?;
        let destination = MatchSpec::parse(&config.destination_match_mode, &config.destination)?;
        let l4 = config
            .l4_types
            .iter()
            .map(|s| s.parse::<L4Type>())
            .collect::<QosResult<Vec<_>>>()?;

        let mut rule = ClassRule::new(&config.name, config.priority, source, destination, config.queue_number)
            .with_l4(l4);
        rule.ingress_interface = config.ingress_interface;
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ia(s: &str) -> IA {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!(MatchSpec::parse("exact", "1-ff00:0:110").unwrap(), MatchSpec::Exact(ia("1-ff00:0:110")));
        assert_eq!(MatchSpec::parse("ISDONLY", "2").unwrap(), MatchSpec::IsdOnly(Isd(2)));
        assert_eq!(MatchSpec::parse("ISDONLY", "2-ff00:0:1").unwrap(), MatchSpec::IsdOnly(Isd(2)));
        assert_eq!(MatchSpec::parse("ASONLY", "1-ff00:0:1").unwrap(), MatchSpec::AsOnly(Asn(0xff00_0000_0001)));
        assert_eq!(MatchSpec::parse("ANY", "").unwrap(), MatchSpec::Any);
        assert_eq!(
            MatchSpec::parse("RANGE", "1-ff00:0:110||1-ff00:0:112").unwrap(),
            MatchSpec::Range(ia("1-ff00:0:110"), ia("1-ff00:0:112"))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(MatchSpec::parse("PREFIX", "1-1"), Err(QosError::InvalidMatchMode(_))));
        assert!(matches!(MatchSpec::parse("EXACT", "nonsense"), Err(QosError::InvalidIa(_))));
        assert!(matches!(MatchSpec::parse("RANGE", "1-5"), Err(QosError::InvalidRange(_))));
        assert!(matches!(MatchSpec::parse("RANGE", "1-9||1-5"), Err(QosError::InvalidRange(_))));
    }

    #[test]
    fn test_rule_from_config() {
        let config = RuleConfig {
            name: "voice".into(),
            priority: 4,
            source: "1-ff00:0:110".into(),
            source_match_mode: "EXACT".into(),
            l4_types: vec!["udp".into(), "TCP".into(), "17".into()],
            queue_number: 2,
            ..Default::default()
        };
        let rule = ClassRule::try_from(&config).unwrap();
        assert_eq!(rule.l4_types, vec![L4Type::TCP, L4Type::UDP]);
        assert_eq!(rule.destination, MatchSpec::Any);

        let bad = RuleConfig { l4_types: vec!["QUIC".into()], ..config };
        assert!(matches!(ClassRule::try_from(&bad), Err(QosError::InvalidL4Type(_))));
    }

    #[test]
    fn test_l4_matching_uses_extensions() {
        let rule = ClassRule::new("hbh", 1, MatchSpec::Any, MatchSpec::Any, 1).with_l4([L4Type::HBH]);
        assert!(!rule.matches_l4(L4Type::UDP, &[]));
        assert!(rule.matches_l4(L4Type::UDP, &[L4Type::HBH]));
        assert!(ClassRule::default_rule().matches_l4(L4Type::UDP, &[]));
    }

    proptest! {
        #[test]
        fn range_matches_iff_within_bounds(
            lo_isd in 0u16..4, lo_as in 0u64..1000,
            span_isd in 0u16..3, span_as in 0u64..1000,
            x_isd in 0u16..8, x_as in 0u64..2000,
        ) {
            let lo = IA::new(lo_isd, lo_as);
            let hi = IA::new(lo_isd + span_isd, lo_as + span_as);
            let x = IA::new(x_isd, x_as);
            let spec = MatchSpec::Range(lo, hi);
            prop_assert_eq!(spec.matches(x), lo <= x && x <= hi);
            prop_assert!(spec.matches(lo));
            prop_assert!(spec.matches(hi));
        }
    }
}
