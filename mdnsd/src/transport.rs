use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use if_addrs::{IfAddr, Interface};
use mdns_engine::dns::wire::{from_packet, to_packet};
use mdns_engine::{Message, Server, ServerEvent};
use shared::protocol::{MDNS_IPV4_ADDRESS, MDNS_IPV6_ADDRESS, MDNS_PORT};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

const EVENT_CAPACITY: usize = 1024;
/// Largest mDNS datagram we accept (RFC 6762 section 17)
const RECEIVE_BUFFER: usize = 9000;

/// mDNS over UDP multicast on every non-loopback interface
pub struct UdpServer {
    v4: Option<Arc<UdpSocket>>,
    v6: Option<Arc<UdpSocket>>,
    /// Interfaces whose multicast group we joined
    interfaces: Mutex<Vec<Interface>>,
    events: broadcast::Sender<ServerEvent>,
}

impl UdpServer {
    /// Bind the sockets, join the groups and start receiving
    pub fn start(config: &ServerConfig, cancel: CancellationToken) -> Result<Arc<Self>> {
        if !config.ipv4 && !config.ipv6 {
            bail!("Both IPv4 and IPv6 are disabled");
        }
        let v4 = if config.ipv4 { Some(Arc::new(bind_v4()?)) } else { None };
        let v6 = if config.ipv6 { Some(Arc::new(bind_v6()?)) } else { None };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let server = Arc::new(Self {
            v4,
            v6,
            interfaces: Mutex::new(Vec::new()),
            events,
        });
        server.join_new_interfaces();

        for socket in [&server.v4, &server.v6].into_iter().flatten() {
            tokio::spawn(receive(socket.clone(), server.events.clone(), cancel.clone()));
        }
        let period = Duration::from_secs(config.rejoin_interval_secs.max(1));
        tokio::spawn(rejoin(server.clone(), period, cancel));

        Ok(server)
    }

    fn joined(&self) -> MutexGuard<'_, Vec<Interface>> {
        self.interfaces.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Join the multicast group on interfaces that appeared since the last call
    /// and forget the ones that went away
    fn join_new_interfaces(&self) {
        let current: Vec<Interface> = match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces.into_iter().filter(|i| !i.is_loopback()).collect(),
            Err(e) => {
                tracing::warn!("Failed to list network interfaces: {}", e);
                return;
            }
        };

        let mut joined = self.joined();
        joined.retain(|known| current.iter().any(|i| i.name == known.name && i.ip() == known.ip()));

        for interface in current {
            if joined.iter().any(|known| known.name == interface.name && known.ip() == interface.ip()) {
                continue;
            }
            let result = match (&interface.addr, &self.v4, &self.v6) {
                (IfAddr::V4(addr), Some(socket), _) => socket.join_multicast_v4(MDNS_IPV4_ADDRESS, addr.ip),
                (IfAddr::V6(_), _, Some(socket)) => {
                    // Membership is per interface, not per address
                    let member = joined
                        .iter()
                        .any(|known| matches!(known.addr, IfAddr::V6(_)) && known.index == interface.index);
                    if member {
                        Ok(())
                    } else {
                        socket.join_multicast_v6(&MDNS_IPV6_ADDRESS, interface.index.unwrap_or(0))
                    }
                }
                _ => continue,
            };
            match result {
                Ok(()) => {
                    tracing::info!("Listening on {} ({})", interface.name, interface.ip());
                    joined.push(interface);
                }
                Err(e) => {
                    tracing::warn!("Failed to join mDNS group on {} ({}): {}", interface.name, interface.ip(), e);
                }
            }
        }
    }

    fn report(&self, error: String) {
        tracing::warn!("{}", error);
        let _ = self.events.send(ServerEvent::Error(error));
    }

    fn encode(&self, message: &Message) -> Option<Vec<u8>> {
        match to_packet(message) {
            Ok(packet) => Some(packet),
            Err(e) => {
                self.report(format!("Failed to encode message: {}", e));
                None
            }
        }
    }
}

impl Server for UdpServer {
    fn send_message(&self, message: &Message) {
        let Some(packet) = self.encode(message) else {
            return;
        };
        let target = SocketAddr::new(message.address, message.port);
        let socket = match target {
            SocketAddr::V4(_) => &self.v4,
            SocketAddr::V6(_) => &self.v6,
        };
        let Some(socket) = socket else {
            tracing::debug!("No socket for {}, reply dropped", target);
            return;
        };
        if let Err(e) = socket.try_send_to(&packet, target) {
            self.report(format!("Failed to send to {}: {}", target, e));
        }
    }

    fn send_message_to_all(&self, message: &Message) {
        let Some(packet) = self.encode(message) else {
            return;
        };
        let interfaces = self.joined().clone();
        let mut v6_indexes = HashSet::new();

        for interface in &interfaces {
            let result = match (&interface.addr, &self.v4, &self.v6) {
                (IfAddr::V4(addr), Some(socket), _) => SockRef::from(socket.as_ref())
                    .set_multicast_if_v4(&addr.ip)
                    .and_then(|()| socket.try_send_to(&packet, SocketAddr::from((MDNS_IPV4_ADDRESS, MDNS_PORT)))),
                (IfAddr::V6(_), _, Some(socket)) => {
                    let index = interface.index.unwrap_or(0);
                    if !v6_indexes.insert(index) {
                        continue;
                    }
                    let target = SocketAddrV6::new(MDNS_IPV6_ADDRESS, MDNS_PORT, 0, index);
                    socket.try_send_to(&packet, target.into())
                }
                _ => continue,
            };
            if let Err(e) = result {
                self.report(format!("Failed to send on {} ({}): {}", interface.name, interface.ip(), e));
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    fn local_addresses(&self, peer: IpAddr) -> Vec<IpAddr> {
        let interfaces = self.joined();
        if peer.is_unspecified() {
            return interfaces.iter().map(Interface::ip).collect();
        }
        let Some(name) = interfaces.iter().find(|i| contains(&i.addr, peer)).map(|i| i.name.clone()) else {
            return Vec::new();
        };
        interfaces.iter().filter(|i| i.name == name).map(Interface::ip).collect()
    }
}

fn same_subnet<const N: usize>(address: [u8; N], peer: [u8; N], netmask: [u8; N]) -> bool {
    address
        .iter()
        .zip(peer)
        .zip(netmask)
        .all(|((address, peer), mask)| address & mask == peer & mask)
}

fn contains(addr: &IfAddr, peer: IpAddr) -> bool {
    match (addr, peer) {
        (IfAddr::V4(addr), IpAddr::V4(peer)) => same_subnet(addr.ip.octets(), peer.octets(), addr.netmask.octets()),
        (IfAddr::V6(addr), IpAddr::V6(peer)) => same_subnet(addr.ip.octets(), peer.octets(), addr.netmask.octets()),
        _ => false,
    }
}

fn bind_v4() -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("Failed to create IPv4 socket")?;
    socket.set_reuse_address(true).context("Failed to set SO_REUSEADDR")?;
    #[cfg(unix)]
    socket.set_reuse_port(true).context("Failed to set SO_REUSEPORT")?;
    socket.set_multicast_ttl_v4(255).context("Failed to set multicast TTL")?;
    socket.set_multicast_loop_v4(true).context("Failed to enable multicast loopback")?;
    socket.set_nonblocking(true).context("Failed to set non-blocking")?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, MDNS_PORT));
    socket.bind(&addr.into()).with_context(|| format!("Failed to bind to {}", addr))?;

    UdpSocket::from_std(socket.into()).context("Failed to register IPv4 socket")
}

fn bind_v6() -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).context("Failed to create IPv6 socket")?;
    socket.set_only_v6(true).context("Failed to set IPV6_V6ONLY")?;
    socket.set_reuse_address(true).context("Failed to set SO_REUSEADDR")?;
    #[cfg(unix)]
    socket.set_reuse_port(true).context("Failed to set SO_REUSEPORT")?;
    socket.set_multicast_hops_v6(255).context("Failed to set multicast hops")?;
    socket.set_multicast_loop_v6(true).context("Failed to enable multicast loopback")?;
    socket.set_nonblocking(true).context("Failed to set non-blocking")?;

    let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, MDNS_PORT));
    socket.bind(&addr.into()).with_context(|| format!("Failed to bind to {}", addr))?;

    UdpSocket::from_std(socket.into()).context("Failed to register IPv6 socket")
}

async fn receive(socket: Arc<UdpSocket>, events: broadcast::Sender<ServerEvent>, cancel: CancellationToken) {
    let mut buffer = vec![0u8; RECEIVE_BUFFER];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buffer) => {
                match result {
                    Ok((length, peer)) => match from_packet(&buffer[..length]) {
                        Ok(mut message) => {
                            message.address = peer.ip();
                            message.port = peer.port();
                            let _ = events.send(ServerEvent::MessageReceived(message));
                        }
                        Err(e) => tracing::debug!("Dropping packet from {}: {}", peer, e),
                    },
                    Err(e) => {
                        tracing::warn!("Receive failed: {}", e);
                        let _ = events.send(ServerEvent::Error(e.to_string()));
                    }
                }
            }
        }
    }
}

async fn rejoin(server: Arc<UdpServer>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    // The first tick completes immediately and the groups were just joined
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => server.join_new_interfaces(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_subnet_v4() {
        let mask = Ipv4Addr::new(255, 255, 255, 0).octets();
        let local = Ipv4Addr::new(192, 168, 1, 10).octets();
        assert!(same_subnet(local, Ipv4Addr::new(192, 168, 1, 200).octets(), mask));
        assert!(!same_subnet(local, Ipv4Addr::new(192, 168, 2, 10).octets(), mask));
    }

    #[test]
    fn test_same_subnet_v6() {
        let mask: Ipv6Addr = "ffff:ffff:ffff:ffff::".parse().unwrap();
        let local: Ipv6Addr = "fe80::1c2d:3e4f:5a6b:7c8d".parse().unwrap();
        let peer: Ipv6Addr = "fe80::1".parse().unwrap();
        let other: Ipv6Addr = "fd00::1".parse().unwrap();
        assert!(same_subnet(local.octets(), peer.octets(), mask.octets()));
        assert!(!same_subnet(local.octets(), other.octets(), mask.octets()));
    }

    #[test]
    fn test_disabled_families_are_rejected() {
        let config = ServerConfig {
            ipv4: false,
            ipv6: false,
            rejoin_interval_secs: 60,
        };
        assert!(UdpServer::start(&config, CancellationToken::new()).is_err());
    }
}
