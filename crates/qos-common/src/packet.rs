//! Packet model handed to the QoS core
//!
//! Header parsing happens upstream; the core only sees the fields it
//! classifies on plus a reference-counted view of the raw bytes.

use crate::error::QosError;
use crate::ia::IA;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// L4 protocol or extension header identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct L4Type(pub u8);

impl L4Type {
    /// TCP
    pub const TCP: L4Type = L4Type(6);
    /// UDP
    pub const UDP: L4Type = L4Type(17);
    /// Hop-by-hop options extension
    pub const HBH: L4Type = L4Type(200);
    /// End-to-end options extension
    pub const E2E: L4Type = L4Type(201);
    /// SCMP control messages
    pub const SCMP: L4Type = L4Type(202);

    fn name(self) -> Option<&'static str> {
        match self {
            L4Type::TCP => Some("TCP"),
            L4Type::UDP => Some("UDP"),
            L4Type::HBH => Some("HBH"),
            L4Type::E2E => Some("E2E"),
            L4Type::SCMP => Some("SCMP"),
            _ => None,
        }
    }
}

impl fmt::Display for L4Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for L4Type {
    type Err = QosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(L4Type::TCP),
            "UDP" => Ok(L4Type::UDP),
            "HBH" => Ok(L4Type::HBH),
            "E2E" => Ok(L4Type::E2E),
            "SCMP" => Ok(L4Type::SCMP),
            _ => s
                .parse::<u8>()
                .map(L4Type)
                .map_err(|_| QosError::InvalidL4Type(s.to_string())),
        }
    }
}

impl Serialize for L4Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for L4Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Classification-relevant header fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketHeader {
    /// Source ISD-AS
    pub src: IA,
    /// Destination ISD-AS
    pub dst: IA,
    /// Interface the packet arrived on
    pub ingress: u64,
    /// Upper-layer protocol
    pub l4: L4Type,
    /// Extension headers present before the L4 header
    pub extensions: Vec<L4Type>,
}

impl PacketHeader {
    /// Create header without extensions
    pub fn new(src: IA, dst: IA, ingress: u64, l4: L4Type) -> Self {
        Self { src, dst, ingress, l4, extensions: Vec::new() }
    }

    /// Add extension header types
    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = L4Type>) -> Self {
        self.extensions.extend(extensions);
        self
    }
}

/// A packet in flight through the QoS core
///
/// `data` is a reference-counted handle owned by the forwarding layer.
/// Cloning a `Packet` never copies the payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Parsed header fields
    pub header: PacketHeader,
    /// Raw packet bytes
    pub data: Bytes,
}

impl Packet {
    /// Create packet
    pub fn new(header: PacketHeader, data: Bytes) -> Self {
        Self { header, data }
    }

    /// Packet length in bytes
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l4_names_and_numbers() {
        assert_eq!("tcp".parse::<L4Type>().unwrap(), L4Type::TCP);
        assert_eq!("SCMP".parse::<L4Type>().unwrap(), L4Type::SCMP);
        assert_eq!("17".parse::<L4Type>().unwrap(), L4Type::UDP);
        assert_eq!("99".parse::<L4Type>().unwrap(), L4Type(99));
        assert!("QUIC".parse::<L4Type>().is_err());
        assert!("256".parse::<L4Type>().is_err());
        assert_eq!(L4Type(99).to_string(), "99");
    }

    #[test]
    fn test_packet_clone_shares_payload() {
        let pkt = Packet::new(PacketHeader::default(), Bytes::from(vec![0u8; 64]));
        let copy = pkt.clone();
        assert_eq!(pkt.data.as_ptr(), copy.data.as_ptr());
        assert_eq!(copy.len(), 64);
    }
}
