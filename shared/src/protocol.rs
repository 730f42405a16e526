use std::net::{Ipv4Addr, Ipv6Addr};

/// UDP port used by all mDNS traffic
pub const MDNS_PORT: u16 = 5353;

/// IPv4 multicast group for mDNS
pub const MDNS_IPV4_ADDRESS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// IPv6 link-local multicast group for mDNS
pub const MDNS_IPV6_ADDRESS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// DNS-SD meta-query type that enumerates every service type on the link
pub const BROWSE_TYPE: &str = "_services._dns-sd._udp.local.";

/// TXT record key carrying a stable device identifier
pub const TXT_UUID: &str = "uuid";
