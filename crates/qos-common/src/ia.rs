//! Routing domain identifiers
//!
//! An [`IA`] names one autonomous routing domain: the isolation domain
//! ([`Isd`]) it belongs to and its AS number ([`Asn`]). Ordering is
//! lexicographic (ISD first, then AS), which is what range rules rely on.

use crate::error::QosError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Largest AS number representable in the `hhhh:hhhh:hhhh` notation
pub const MAX_ASN: u64 = (1 << 48) - 1;

/// AS numbers below this bound are written in decimal (BGP compatible)
const BGP_ASN_LIMIT: u64 = 1 << 32;

/// Isolation domain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isd(pub u16);

impl fmt::Display for Isd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Isd {
    type Err = QosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .map(Isd)
            .map_err(|_| QosError::InvalidIa(format!("bad ISD {:?}", s)))
    }
}

/// Autonomous system number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Asn(pub u64);

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < BGP_ASN_LIMIT {
            return write!(f, "{}", self.0);
        }
        write!(
            f,
            "{:x}:{:x}:{:x}",
            (self.0 >> 32) & 0xffff,
            (self.0 >> 16) & 0xffff,
            self.0 & 0xffff
        )
    }
}

impl FromStr for Asn {
    type Err = QosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.contains(':') {
            return match s.parse::<u64>() {
                Ok(v) if v < BGP_ASN_LIMIT => Ok(Asn(v)),
                _ => Err(QosError::InvalidIa(format!("bad decimal AS {:?}", s))),
            };
        }

        let groups: Vec<&str> = s.split(':').collect();
        if groups.len() != 3 {
            return Err(QosError::InvalidIa(format!("AS {:?} needs three groups", s)));
        }

        let mut value = 0u64;
        for group in groups {
            if group.is_empty() || group.len() > 4 {
                return Err(QosError::InvalidIa(format!("bad AS group in {:?}", s)));
            }
            let part = u16::from_str_radix(group, 16)
                .map_err(|_| QosError::InvalidIa(format!("bad AS group in {:?}", s)))?;
            value = (value << 16) | part as u64;
        }
        Ok(Asn(value))
    }
}

impl Serialize for Asn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Asn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// ISD-AS pair
///
/// Field order matters: the derived `Ord` compares ISD first, then AS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IA {
    /// Isolation domain
    pub isd: Isd,
    /// AS number within the domain
    pub asn: Asn,
}

impl IA {
    /// Create from raw parts
    pub const fn new(isd: u16, asn: u64) -> Self {
        Self { isd: Isd(isd), asn: Asn(asn) }
    }

    /// Wildcard IA (`0-0`)
    pub const fn wildcard() -> Self {
        Self::new(0, 0)
    }
}

impl fmt::Display for IA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.isd, self.asn)
    }
}

impl FromStr for IA {
    type Err = QosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (isd, asn) = s
            .split_once('-')
            .ok_or_else(|| QosError::InvalidIa(format!("{:?} is not <isd>-<as>", s)))?;
        let isd: Isd = isd.parse()?;
        let asn: Asn = asn.parse()?;
        if asn.0 > MAX_ASN {
            return Err(QosError::InvalidIa(format!("AS out of range in {:?}", s)));
        }
        Ok(IA { isd, asn })
    }
}

impl Serialize for IA {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IA {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
