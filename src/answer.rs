//! Address-family projection and A/AAAA record synthesis.

use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use std::net::IpAddr;

/// Address family requested by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4, answered with A records.
    V4,
    /// IPv6, answered with AAAA records.
    V6,
}

impl AddressFamily {
    /// Family answered by `rtype`, if it is an address record type.
    pub fn from_record_type(rtype: RecordType) -> Option<Self> {
        match rtype {
            RecordType::A => Some(Self::V4),
            RecordType::AAAA => Some(Self::V6),
            _ => None,
        }
    }

    /// The record type emitted for this family.
    pub fn record_type(self) -> RecordType {
        match self {
            Self::V4 => RecordType::A,
            Self::V6 => RecordType::AAAA,
        }
    }

    /// Whether `ip` belongs to this family.
    ///
    /// Purely by representation; IPv4-mapped addresses are expected to have
    /// been canonicalized by the resolver already.
    pub fn contains(self, ip: &IpAddr) -> bool {
        matches!(
            (self, ip),
            (Self::V4, IpAddr::V4(_)) | (Self::V6, IpAddr::V6(_))
        )
    }
}

/// Addresses of a single family, ready to become answer records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAnswer {
    /// Owner name for every record.
    pub name: Name,
    /// TTL for every record.
    pub ttl: u32,
    /// Family of every address in `addresses`.
    pub family: AddressFamily,
    /// Addresses, all of `family`.
    pub addresses: Vec<IpAddr>,
}

impl ResolvedAnswer {
    /// Project `ips` onto `family`, dropping addresses of the other family.
    pub fn project(name: Name, ttl: u32, family: AddressFamily, ips: &[IpAddr]) -> Self {
        let addresses = ips
            .iter()
            .filter(|ip| family.contains(ip))
            .copied()
            .collect();

        Self {
            name,
            ttl,
            family,
            addresses,
        }
    }

    /// Build one record per address.
    pub fn records(&self) -> Vec<Record> {
        self.addresses
            .iter()
            .map(|ip| {
                let rdata = match ip {
                    IpAddr::V4(v4) => RData::A(A::from(*v4)),
                    IpAddr::V6(v6) => RData::AAAA(AAAA::from(*v6)),
                };
                let mut record = Record::from_rdata(self.name.clone(), self.ttl, rdata);
                record.set_dns_class(DNSClass::IN);
                record
            })
            .collect()
    }
}
