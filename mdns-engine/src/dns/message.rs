use std::net::{IpAddr, Ipv4Addr};

use shared::protocol::{MDNS_IPV4_ADDRESS, MDNS_IPV6_ADDRESS, MDNS_PORT};

use super::query::Query;
use super::record::Record;

/// A DNS message, either decoded from a datagram or about to be sent.
///
/// `address` and `port` are the peer: the sender of a received message or the
/// destination of an outgoing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub address: IpAddr,
    pub port: u16,
    /// Zero for mDNS; echoed back when answering legacy unicast DNS queries
    pub transaction_id: u16,
    pub is_response: bool,
    pub queries: Vec<Query>,
    pub records: Vec<Record>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            transaction_id: 0,
            is_response: false,
            queries: Vec::new(),
            records: Vec::new(),
        }
    }
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty response
    pub fn response() -> Self {
        Self {
            is_response: true,
            ..Self::default()
        }
    }

    /// A response addressed to the sender of `other`.
    ///
    /// Queries from the mDNS port are answered on the multicast group of the
    /// same address family; anything else (legacy unicast DNS) is answered
    /// directly, echoing the transaction id.
    pub fn reply(other: &Message) -> Self {
        let address = if other.port == MDNS_PORT {
            match other.address {
                IpAddr::V4(_) => IpAddr::V4(MDNS_IPV4_ADDRESS),
                IpAddr::V6(_) => IpAddr::V6(MDNS_IPV6_ADDRESS),
            }
        } else {
            other.address
        };
        Self {
            address,
            port: other.port,
            transaction_id: other.transaction_id,
            is_response: true,
            ..Self::default()
        }
    }

    pub fn add_query(&mut self, query: Query) {
        self.queries.push(query);
    }

    pub fn add_record(&mut self, record: Record) {
        self.records.push(record);
    }
}
