//! In-memory transport for component tests.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use shared::protocol::{MDNS_IPV4_ADDRESS, MDNS_PORT};
use tokio::sync::broadcast;

use crate::dns::{Message, Record};
use crate::server::{Server, ServerEvent};

pub(crate) struct TestServer {
    sent: Mutex<Vec<Message>>,
    events: broadcast::Sender<ServerEvent>,
    addresses: Vec<IpAddr>,
}

impl TestServer {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_addresses(vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10))])
    }

    pub(crate) fn with_addresses(addresses: Vec<IpAddr>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            events,
            addresses,
        })
    }

    /// Hand a message to every subscriber as if it came off the wire
    pub(crate) fn deliver(&self, message: Message) {
        let _ = self.events.send(ServerEvent::MessageReceived(message));
    }

    pub(crate) fn fail(&self, error: &str) {
        let _ = self.events.send(ServerEvent::Error(error.to_string()));
    }

    pub(crate) fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Whether any sent message asks for `name` / `rtype`
    pub(crate) fn query_sent(&self, name: &str, rtype: u16) -> bool {
        self.sent()
            .iter()
            .flat_map(|message| &message.queries)
            .any(|query| query.name == name && query.rtype == rtype)
    }

    /// Records of every sent response, in order
    pub(crate) fn answers(&self) -> Vec<Record> {
        self.sent()
            .into_iter()
            .filter(|message| message.is_response)
            .flat_map(|message| message.records)
            .collect()
    }
}

impl Server for TestServer {
    fn send_message(&self, message: &Message) {
        self.sent.lock().unwrap().push(message.clone());
    }

    fn send_message_to_all(&self, message: &Message) {
        let mut message = message.clone();
        message.address = IpAddr::V4(MDNS_IPV4_ADDRESS);
        message.port = MDNS_PORT;
        self.sent.lock().unwrap().push(message);
    }

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    fn local_addresses(&self, _peer: IpAddr) -> Vec<IpAddr> {
        self.addresses.clone()
    }
}
