use std::fmt;
use std::net::IpAddr;

use shared::types::Attributes;

use super::bitmap::Bitmap;
use super::type_name;

/// TTL given to records that do not set one
pub const DEFAULT_TTL: u32 = 3600;

/// A resource record.
///
/// Only the fields meaningful for `rtype` are encoded: `address` for A/AAAA,
/// `target` for PTR/SRV, `priority`/`weight`/`port` for SRV, `attributes` for
/// TXT and `next_domain_name`/`bitmap` for NSEC. A TTL of zero announces that
/// the record is being withdrawn.
#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    pub rtype: u16,
    pub flush_cache: bool,
    pub ttl: u32,
    pub address: Option<IpAddr>,
    pub target: String,
    pub next_domain_name: String,
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub attributes: Attributes,
    pub bitmap: Bitmap,
}

impl Record {
    pub fn new(name: impl Into<String>, rtype: u16) -> Self {
        Self {
            name: name.into(),
            rtype,
            ..Self::default()
        }
    }

    /// Same name and type, regardless of data
    pub fn same_rrset(&self, other: &Record) -> bool {
        self.name == other.name && self.rtype == other.rtype
    }
}

impl Default for Record {
    fn default() -> Self {
        Self {
            name: String::new(),
            rtype: 0,
            flush_cache: false,
            ttl: DEFAULT_TTL,
            address: None,
            target: String::new(),
            next_domain_name: String::new(),
            priority: 0,
            weight: 0,
            port: 0,
            attributes: Attributes::new(),
            bitmap: Bitmap::default(),
        }
    }
}

/// Records are equal when they carry the same data; `ttl` and `flush_cache`
/// describe the announcement, not the record.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.rtype == other.rtype
            && self.address == other.address
            && self.target == other.target
            && self.next_domain_name == other.next_domain_name
            && self.priority == other.priority
            && self.weight == other.weight
            && self.port == other.port
            && self.attributes == other.attributes
            && self.bitmap == other.bitmap
    }
}

impl Eq for Record {}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ttl={}", self.name, type_name(self.rtype), self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{SRV, TXT};

    #[test]
    fn test_default_ttl() {
        assert_eq!(Record::new("test.", TXT).ttl, DEFAULT_TTL);
    }

    #[test]
    fn test_equality_ignores_ttl_and_flush() {
        let record = Record {
            port: 80,
            ..Record::new("a._http._tcp.local.", SRV)
        };
        let refreshed = Record {
            ttl: 0,
            flush_cache: true,
            ..record.clone()
        };
        assert_eq!(record, refreshed);

        let moved = Record {
            port: 8080,
            ..record.clone()
        };
        assert_ne!(record, moved);
        assert!(record.same_rrset(&moved));
    }

    #[test]
    fn test_display_names_the_type() {
        let record = Record {
            ttl: 120,
            ..Record::new("a._http._tcp.local.", SRV)
        };
        assert_eq!(record.to_string(), "a._http._tcp.local. SRV ttl=120");
    }
}
