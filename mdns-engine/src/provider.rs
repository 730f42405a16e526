use std::sync::Arc;

use shared::protocol::BROWSE_TYPE;
use shared::types::Service;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dns::{type_name, Message, Record, ANY, PTR, SRV, TXT};
use crate::hostname::Hostname;
use crate::prober::{wait_confirmed, Prober};
use crate::server::{recv_event, Server, ServerEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The service is announced under this instance name
    Published(String),
    /// The transport reported a failure; the service may not be reachable
    TransportError(String),
}

/// Publishes one service on the local link.
///
/// Nothing is announced until the [`Hostname`] is registered and the instance
/// name has been probed. Dropping the provider withdraws the service;
/// [`Provider::shutdown`] does the same and waits for the goodbye to be sent.
pub struct Provider {
    updates: mpsc::UnboundedSender<Service>,
    events: flume::Receiver<ProviderEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Provider {
    pub fn new(server: Arc<dyn Server>, hostname: &Hostname) -> Self {
        let cancel = CancellationToken::new();
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let (tx, events) = flume::unbounded();
        let task = ProviderTask {
            events: server.subscribe(),
            server,
            hostname: hostname.subscribe(),
            current_hostname: None,
            service: None,
            prober: None,
            proposed: None,
            published: None,
            tx,
        };
        let task = tokio::spawn(task.run(updates_rx, cancel.clone()));
        Self {
            updates,
            events,
            cancel,
            task: Some(task),
        }
    }

    /// Publish `service`, or replace what is published
    pub fn update(&self, service: Service) {
        if self.updates.send(service).is_err() {
            tracing::warn!("Provider task is gone, update dropped");
        }
    }

    pub fn events(&self) -> flume::Receiver<ProviderEvent> {
        self.events.clone()
    }

    /// Withdraw the service and wait until the goodbye has gone out
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Provider task failed: {}", e);
            }
        }
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The records describing one service instance
#[derive(Debug, Clone)]
struct RecordSet {
    browse_ptr: Record,
    ptr: Record,
    srv: Record,
    txt: Record,
}

impl RecordSet {
    fn new(service: &Service, hostname: &str) -> Self {
        let fqdn = Service {
            name: service.name.replace('.', "-"),
            ..service.clone()
        }
        .fqdn();
        Self {
            browse_ptr: Record {
                target: service.service_type.clone(),
                ..Record::new(BROWSE_TYPE, PTR)
            },
            ptr: Record {
                target: fqdn.clone(),
                ..Record::new(service.service_type.clone(), PTR)
            },
            srv: Record {
                flush_cache: true,
                port: service.port,
                target: hostname.to_string(),
                ..Record::new(fqdn.clone(), SRV)
            },
            txt: Record {
                flush_cache: true,
                attributes: service.attributes.clone(),
                ..Record::new(fqdn, TXT)
            },
        }
    }

    fn rename(&mut self, fqdn: &str) {
        self.ptr.target = fqdn.to_string();
        self.srv.name = fqdn.to_string();
        self.txt.name = fqdn.to_string();
    }

    fn announcement(&self) -> Message {
        let mut message = Message::response();
        message.add_record(self.ptr.clone());
        message.add_record(self.srv.clone());
        message.add_record(self.txt.clone());
        message
    }
}

struct ProviderTask {
    server: Arc<dyn Server>,
    events: broadcast::Receiver<ServerEvent>,
    hostname: watch::Receiver<Option<String>>,
    current_hostname: Option<String>,
    /// Latest service handed to `update`
    service: Option<Service>,
    prober: Option<Prober>,
    /// Records waiting for the prober
    proposed: Option<RecordSet>,
    published: Option<RecordSet>,
    tx: flume::Sender<ProviderEvent>,
}

impl ProviderTask {
    async fn run(mut self, mut updates: mpsc::UnboundedReceiver<Service>, cancel: CancellationToken) {
        let mut hostname_alive = true;
        self.current_hostname = self.hostname.borrow_and_update().clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.farewell();
                    break;
                }
                Some(service) = updates.recv() => {
                    self.service = Some(service);
                    self.refresh();
                }
                confirmed = wait_confirmed(&mut self.prober) => {
                    self.prober = None;
                    match confirmed {
                        Some(name) => self.on_confirmed(&name),
                        None => tracing::warn!("Service prober stopped without confirming"),
                    }
                }
                changed = self.hostname.changed(), if hostname_alive => {
                    match changed {
                        Ok(()) => {
                            let hostname = self.hostname.borrow_and_update().clone();
                            self.on_hostname_changed(hostname);
                        }
                        Err(_) => hostname_alive = false,
                    }
                }
                event = recv_event(&mut self.events, "Provider") => {
                    match event {
                        Some(ServerEvent::MessageReceived(message)) if !message.is_response => {
                            self.answer(&message);
                        }
                        Some(ServerEvent::MessageReceived(_)) => {}
                        Some(ServerEvent::Error(e)) => {
                            tracing::warn!("Transport error while publishing: {}", e);
                            let _ = self.tx.send(ProviderEvent::TransportError(e));
                        }
                        None => break,
                    }
                }
            }
        }
    }

    fn proposal(&self) -> Option<RecordSet> {
        let service = self.service.as_ref()?;
        let hostname = self.current_hostname.as_deref()?;
        Some(RecordSet::new(service, hostname))
    }

    /// Apply the latest service: probe a new name, or republish in place
    fn refresh(&mut self) {
        let Some(proposed) = self.proposal() else {
            tracing::debug!("Hostname not registered yet, holding service");
            return;
        };
        let same_name = self
            .published
            .as_ref()
            .is_some_and(|published| published.srv.name == proposed.srv.name);
        if same_name && self.prober.is_none() {
            self.publish(proposed);
        } else {
            self.confirm(proposed);
        }
    }

    fn on_hostname_changed(&mut self, hostname: Option<String>) {
        if hostname == self.current_hostname {
            return;
        }
        self.current_hostname = hostname;
        if let Some(proposed) = self.proposal() {
            self.confirm(proposed);
        }
    }

    fn confirm(&mut self, proposed: RecordSet) {
        tracing::debug!("Probing service name {}", proposed.srv.name);
        self.prober = Some(Prober::new(self.server.clone(), proposed.srv.clone()));
        self.proposed = Some(proposed);
    }

    fn on_confirmed(&mut self, name: &str) {
        let Some(mut records) = self.proposed.take() else {
            return;
        };
        self.farewell();
        records.rename(name);
        self.publish(records);
    }

    fn publish(&mut self, records: RecordSet) {
        tracing::info!("Publishing {}", records.srv.name);
        self.server.send_message_to_all(&records.announcement());
        let _ = self.tx.send(ProviderEvent::Published(records.srv.name.clone()));
        self.published = Some(records);
    }

    fn farewell(&mut self) {
        let Some(mut records) = self.published.take() else {
            return;
        };
        tracing::info!("Withdrawing {}", records.srv.name);
        records.ptr.ttl = 0;
        records.srv.ttl = 0;
        records.txt.ttl = 0;
        self.server.send_message_to_all(&records.announcement());
    }

    fn answer(&self, message: &Message) {
        // Our own probe must not be mistaken for someone else's answer
        if self.prober.is_some() {
            return;
        }
        let Some(records) = &self.published else {
            return;
        };

        let mut send_browse_ptr = false;
        let mut send_ptr = false;
        let mut send_srv = false;
        let mut send_txt = false;

        for query in &message.queries {
            let asks_for = |rtype: u16| query.rtype == rtype || query.rtype == ANY;
            if asks_for(PTR) && query.name == records.browse_ptr.name {
                send_browse_ptr = true;
            }
            if asks_for(PTR) && query.name == records.ptr.name {
                send_ptr = true;
            }
            if asks_for(SRV) && query.name == records.srv.name {
                send_srv = true;
            }
            if asks_for(TXT) && query.name == records.txt.name {
                send_txt = true;
            }
        }

        for known in &message.records {
            if *known == records.browse_ptr {
                send_browse_ptr = false;
            } else if *known == records.ptr {
                send_ptr = false;
            } else if *known == records.srv {
                send_srv = false;
            } else if *known == records.txt {
                send_txt = false;
            }
        }

        if send_ptr || send_srv {
            send_srv = true;
            send_txt = true;
        }

        let mut reply = Message::reply(message);
        if send_browse_ptr {
            reply.add_record(records.browse_ptr.clone());
        }
        if send_ptr {
            reply.add_record(records.ptr.clone());
        }
        if send_srv {
            reply.add_record(records.srv.clone());
        }
        if send_txt {
            reply.add_record(records.txt.clone());
        }
        if !reply.records.is_empty() {
            let types: Vec<&str> = reply.records.iter().map(|record| type_name(record.rtype)).collect();
            tracing::debug!("Answering for {} with {}", records.srv.name, types.join(" "));
            self.server.send_message(&reply);
        }
    }
}
