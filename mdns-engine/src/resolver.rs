use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::cache_manager::CacheHandle;
use crate::dns::{Message, Query, Record, A, AAAA};
use crate::server::{recv_event, Server, ServerEvent};

/// Looks up the addresses of a hostname.
///
/// Each distinct address is reported once on [`Resolver::resolved`], starting
/// with the ones already cached.
pub struct Resolver {
    resolved: flume::Receiver<IpAddr>,
    _guard: DropGuard,
}

impl Resolver {
    /// Resolve `name`, sharing `cache` when given or keeping a private one
    pub fn new(server: Arc<dyn Server>, name: impl Into<String>, cache: Option<CacheHandle>) -> Self {
        let cancel = CancellationToken::new();
        let (tx, resolved) = flume::unbounded();
        let task = ResolverTask {
            events: server.subscribe(),
            server,
            name: name.into(),
            cache: cache.unwrap_or_else(CacheHandle::spawn),
            seen: HashSet::new(),
            tx,
        };
        tokio::spawn(task.run(cancel.clone()));
        Self {
            resolved,
            _guard: cancel.drop_guard(),
        }
    }

    pub fn resolved(&self) -> flume::Receiver<IpAddr> {
        self.resolved.clone()
    }
}

struct ResolverTask {
    server: Arc<dyn Server>,
    events: broadcast::Receiver<ServerEvent>,
    name: String,
    cache: CacheHandle,
    seen: HashSet<IpAddr>,
    tx: flume::Sender<IpAddr>,
}

impl ResolverTask {
    async fn run(mut self, cancel: CancellationToken) {
        let known = self.existing().await;

        let mut message = Message::new();
        message.add_query(Query::new(self.name.clone(), A));
        message.add_query(Query::new(self.name.clone(), AAAA));
        message.records.extend(known.iter().cloned());
        self.server.send_message_to_all(&message);

        for record in &known {
            self.report(record);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = recv_event(&mut self.events, "Resolver") => {
                    match event {
                        Some(ServerEvent::MessageReceived(message)) if message.is_response => {
                            self.on_response(message);
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        }
    }

    async fn existing(&self) -> Vec<Record> {
        let mut records = self.cache.lookup_records(Some(&self.name), A).await;
        records.extend(self.cache.lookup_records(Some(&self.name), AAAA).await);
        records
    }

    fn on_response(&mut self, message: Message) {
        for record in message.records {
            if record.name != self.name || !matches!(record.rtype, A | AAAA) {
                continue;
            }
            if record.ttl > 0 {
                self.report(&record);
            }
            self.cache.add_record(record);
        }
    }

    fn report(&mut self, record: &Record) {
        let Some(address) = record.address else {
            return;
        };
        if self.seen.insert(address) {
            tracing::debug!("Resolved {} to {}", self.name, address);
            let _ = self.tx.send(address);
        }
    }
}
