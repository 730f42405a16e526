use std::net::IpAddr;

use tokio::sync::broadcast;

use crate::dns::Message;

/// Notifications from the transport
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A datagram was decoded; `address` and `port` identify the sender
    MessageReceived(Message),
    /// The transport failed to send or receive
    Error(String),
}

/// Boundary between the engine and the network.
///
/// Implementations send on every multicast-capable interface and fan received
/// messages out to every subscriber. Sending never blocks; failures are
/// reported through [`ServerEvent::Error`].
pub trait Server: Send + Sync + 'static {
    /// Send to `message.address` / `message.port`
    fn send_message(&self, message: &Message);

    /// Send to the mDNS multicast groups on every interface
    fn send_message_to_all(&self, message: &Message);

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent>;

    /// Local addresses on the interface through which `peer` is reachable
    fn local_addresses(&self, _peer: IpAddr) -> Vec<IpAddr> {
        Vec::new()
    }
}

/// Receive the next event, skipping over anything lost to lag.
///
/// Returns `None` once every sender is gone.
pub(crate) async fn recv_event<T: Clone>(rx: &mut broadcast::Receiver<T>, source: &str) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("{} subscriber lagged, {} events dropped", source, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
