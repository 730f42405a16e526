use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use shared::protocol::BROWSE_TYPE;
use shared::types::{Attributes, Service};
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::cache::CacheEvent;
use crate::cache_manager::CacheHandle;
use crate::dns::{Message, Query, Record, PTR, SRV, TXT};
use crate::server::{recv_event, Server, ServerEvent};

/// Interval between browse queries
pub const QUERY_INTERVAL: Duration = Duration::from_secs(60);
/// Quiet period after the last service type answer before asking for instances
const SERVICE_TYPE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEvent {
    Added(Service),
    Updated(Service),
    Removed(Service),
}

/// Discovers instances of a service type.
///
/// Browsing [`BROWSE_TYPE`] discovers every service type on the link and then
/// every instance of each.
pub struct Browser {
    events: flume::Receiver<BrowserEvent>,
    _guard: DropGuard,
}

impl Browser {
    /// Browse `service_type` (e.g. `"_http._tcp.local."`), sharing `cache`
    /// when given or keeping a private one
    pub fn new(server: Arc<dyn Server>, service_type: impl Into<String>, cache: Option<CacheHandle>) -> Self {
        let cancel = CancellationToken::new();
        let (tx, events) = flume::unbounded();
        let cache = cache.unwrap_or_else(CacheHandle::spawn);
        let task = BrowserTask {
            events: server.subscribe(),
            cache_events: cache.subscribe(),
            server,
            service_type: service_type.into(),
            cache,
            services: HashMap::new(),
            ptr_targets: BTreeSet::new(),
            tx,
        };
        tokio::spawn(task.run(cancel.clone()));
        Self {
            events,
            _guard: cancel.drop_guard(),
        }
    }

    pub fn events(&self) -> flume::Receiver<BrowserEvent> {
        self.events.clone()
    }
}

/// Why an instance cannot be reported
enum Missing {
    Ptr,
    Srv,
}

struct BrowserTask {
    server: Arc<dyn Server>,
    events: broadcast::Receiver<ServerEvent>,
    cache_events: broadcast::Receiver<CacheEvent>,
    service_type: String,
    cache: CacheHandle,
    /// Reported instances by FQDN
    services: HashMap<String, Service>,
    /// Service types seen since the last type query
    ptr_targets: BTreeSet<String>,
    tx: flume::Sender<BrowserEvent>,
}

impl BrowserTask {
    async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Browsing for {}", self.service_type);

        let mut query_timer = interval(QUERY_INTERVAL);
        let service_timer = sleep(SERVICE_TYPE_DELAY);
        tokio::pin!(service_timer);
        let mut service_timer_armed = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = query_timer.tick() => self.send_browse_query().await,
                _ = &mut service_timer, if service_timer_armed => {
                    service_timer_armed = false;
                    self.query_service_types();
                }
                event = recv_event(&mut self.events, "Browser") => {
                    match event {
                        Some(ServerEvent::MessageReceived(message)) if message.is_response => {
                            if self.on_response(message).await {
                                service_timer.as_mut().reset(Instant::now() + SERVICE_TYPE_DELAY);
                                service_timer_armed = true;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
                event = recv_event(&mut self.cache_events, "Browser cache") => {
                    match event {
                        Some(CacheEvent::ShouldQuery(record)) => self.on_should_query(record),
                        Some(CacheEvent::RecordExpired(record)) => self.on_record_expired(record).await,
                        None => break,
                    }
                }
            }
        }
    }

    fn is_wildcard(&self) -> bool {
        self.service_type == BROWSE_TYPE
    }

    /// PTR, SRV or TXT records that describe instances of the browsed type
    fn is_tracked(&self, record: &Record) -> bool {
        let wildcard = self.is_wildcard();
        match record.rtype {
            PTR => wildcard || record.name == self.service_type,
            SRV | TXT => {
                wildcard
                    || record
                        .name
                        .strip_suffix(self.service_type.as_str())
                        .is_some_and(|instance| instance.ends_with('.'))
            }
            _ => false,
        }
    }

    async fn send_browse_query(&self) {
        let mut message = Message::new();
        message.add_query(Query::new(self.service_type.clone(), PTR));
        message.records = self.cache.lookup_records(Some(&self.service_type), PTR).await;
        self.server.send_message_to_all(&message);
    }

    fn query_service_types(&mut self) {
        if self.ptr_targets.is_empty() {
            return;
        }
        let mut message = Message::new();
        for target in std::mem::take(&mut self.ptr_targets) {
            message.add_query(Query::new(target, PTR));
        }
        self.server.send_message_to_all(&message);
    }

    /// Returns true when service types were announced
    async fn on_response(&mut self, message: Message) -> bool {
        let mut types_seen = false;
        let mut removed = BTreeSet::new();
        let mut updated = BTreeSet::new();

        for record in message.records {
            if self.is_wildcard() && record.rtype == PTR && record.name == BROWSE_TYPE {
                self.ptr_targets.insert(record.target.clone());
                self.cache.add_record(record);
                types_seen = true;
                continue;
            }
            if !self.is_tracked(&record) {
                continue;
            }
            let instance = if record.rtype == PTR {
                record.target.clone()
            } else {
                record.name.clone()
            };
            if record.ttl == 0 {
                if record.rtype == PTR {
                    removed.insert(instance);
                }
            } else {
                updated.insert(instance);
            }
            self.cache.add_record(record);
        }

        for fqdn in &removed {
            self.remove_service(fqdn);
        }

        let mut message = Message::new();
        for fqdn in updated.difference(&removed) {
            if let Err(Missing::Srv) = self.update_service(fqdn).await {
                message.add_query(Query::new(fqdn.clone(), SRV));
                message.add_query(Query::new(fqdn.clone(), TXT));
            }
        }
        if !message.queries.is_empty() {
            self.server.send_message_to_all(&message);
        }

        types_seen
    }

    /// Build the instance from the cache, provided a PTR still points at it
    /// and its SRV is known.
    async fn lookup_service(&self, fqdn: &str) -> Result<Service, Missing> {
        let (name, service_type) = fqdn.split_once('.').ok_or(Missing::Ptr)?;

        let ptrs = self.cache.lookup_records(Some(service_type), PTR).await;
        if !ptrs.iter().any(|ptr| ptr.target == fqdn) {
            return Err(Missing::Ptr);
        }
        let srv = self.cache.lookup_record(Some(fqdn), SRV).await.ok_or(Missing::Srv)?;

        let mut attributes = Attributes::new();
        for txt in self.cache.lookup_records(Some(fqdn), TXT).await {
            for (key, value) in txt.attributes {
                attributes.entry(key).or_insert(value);
            }
        }

        Ok(Service {
            service_type: service_type.to_string(),
            name: name.to_string(),
            hostname: srv.target,
            port: srv.port,
            attributes,
        })
    }

    async fn update_service(&mut self, fqdn: &str) -> Result<(), Missing> {
        let service = self.lookup_service(fqdn).await?;
        match self.services.get(fqdn) {
            None => {
                tracing::info!("Service added: {}", fqdn);
                self.emit(BrowserEvent::Added(service.clone()));
            }
            Some(existing) if *existing != service => {
                tracing::debug!("Service updated: {}", fqdn);
                self.emit(BrowserEvent::Updated(service.clone()));
            }
            Some(_) => {}
        }
        self.services.insert(fqdn.to_string(), service);
        Ok(())
    }

    fn remove_service(&mut self, fqdn: &str) {
        if let Some(service) = self.services.remove(fqdn) {
            tracing::info!("Service removed: {}", fqdn);
            self.emit(BrowserEvent::Removed(service));
        }
    }

    fn on_should_query(&self, record: Record) {
        if !self.is_tracked(&record) {
            return;
        }
        tracing::debug!("Re-querying {}", record);
        let mut message = Message::new();
        message.add_query(Query::new(record.name, record.rtype));
        self.server.send_message_to_all(&message);
    }

    async fn on_record_expired(&mut self, record: Record) {
        if !self.is_tracked(&record) {
            return;
        }
        let fqdn = match record.rtype {
            PTR => record.target,
            _ => record.name,
        };
        if record.rtype == TXT {
            let _ = self.update_service(&fqdn).await;
            return;
        }
        if !self.services.contains_key(&fqdn) {
            return;
        }
        // A flushed record may already have a replacement in the cache
        if self.update_service(&fqdn).await.is_err() {
            self.remove_service(&fqdn);
        }
    }

    fn emit(&self, event: BrowserEvent) {
        let _ = self.tx.send(event);
    }
}
