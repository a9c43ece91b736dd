//! Answer records produced by the resolver.

use std::fmt;
use std::net::IpAddr;

use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerSource {
    Cache,
    Override,
    Fallback,
}

impl AnswerSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Override => "override",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single address answer for a queried domain.
///
/// The record type is derived from the address family: IPv4 addresses
/// produce A records, IPv6 addresses produce AAAA records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub name: Name,
    pub address: IpAddr,
    pub ttl: u32,
}

impl AnswerRecord {
    pub const fn new(name: Name, address: IpAddr, ttl: u32) -> Self {
        Self { name, address, ttl }
    }

    #[inline]
    pub const fn kind(&self) -> RecordType {
        record_kind(self.address)
    }

    /// Convert into a wire-level resource record.
    pub fn to_record(&self) -> Record {
        let rdata = match self.address {
            IpAddr::V4(ip) => RData::A(A(ip)),
            IpAddr::V6(ip) => RData::AAAA(AAAA(ip)),
        };
        Record::from_rdata(self.name.clone(), self.ttl, rdata)
    }
}

impl fmt::Display for AnswerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\tIN\t{}\t{}", self.name, self.ttl, self.kind(), self.address)
    }
}

/// Record type carrying the given address.
#[inline]
pub const fn record_kind(address: IpAddr) -> RecordType {
    match address {
        IpAddr::V4(_) => RecordType::A,
        IpAddr::V6(_) => RecordType::AAAA,
    }
}
