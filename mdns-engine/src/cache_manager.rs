use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use crate::cache::{CacheEvent, RecordStore};
use crate::dns::Record;

const EVENT_CAPACITY: usize = 256;
/// Upper bound (exclusive) of the random offset added to refresh points
const MAX_JITTER_MS: u64 = 20;

/// Commands sent to the cache task
enum CacheCommand {
    Add(Record),
    LookupOne {
        name: Option<String>,
        rtype: u16,
        reply: oneshot::Sender<Option<Record>>,
    },
    LookupAll {
        name: Option<String>,
        rtype: u16,
        reply: oneshot::Sender<Vec<Record>>,
    },
}

/// Handle to a record cache running in its own task.
///
/// Clones share the same cache; the task stops once every handle is gone.
#[derive(Clone)]
pub struct CacheHandle {
    tx: mpsc::UnboundedSender<CacheCommand>,
    events: broadcast::Sender<CacheEvent>,
}

impl CacheHandle {
    /// Spawn a new cache task on the current runtime
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        tokio::spawn(run(rx, events.clone()));
        Self { tx, events }
    }

    /// Queue a record for insertion. Commands are applied in order, so a
    /// lookup issued afterwards observes it.
    pub fn add_record(&self, record: Record) {
        if self.tx.send(CacheCommand::Add(record)).is_err() {
            tracing::warn!("Cache task is gone, record dropped");
        }
    }

    /// First record matching `name` (any name when `None`) and `rtype` (any type for ANY)
    pub async fn lookup_record(&self, name: Option<&str>, rtype: u16) -> Option<Record> {
        let (reply, rx) = oneshot::channel();
        let command = CacheCommand::LookupOne {
            name: name.map(str::to_string),
            rtype,
            reply,
        };
        if self.tx.send(command).is_err() {
            tracing::warn!("Cache task is gone, lookup failed");
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Every record matching `name` and `rtype`
    pub async fn lookup_records(&self, name: Option<&str>, rtype: u16) -> Vec<Record> {
        let (reply, rx) = oneshot::channel();
        let command = CacheCommand::LookupAll {
            name: name.map(str::to_string),
            rtype,
            reply,
        };
        if self.tx.send(command).is_err() {
            tracing::warn!("Cache task is gone, lookup failed");
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<CacheCommand>, events: broadcast::Sender<CacheEvent>) {
    let mut store = RecordStore::new();

    let publish = |batch: Vec<CacheEvent>| {
        for event in batch {
            tracing::debug!("Cache event: {}", event);
            // Nobody listening is fine
            let _ = events.send(event);
        }
    };

    loop {
        let next = store.next_trigger();
        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(CacheCommand::Add(record)) => {
                        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..MAX_JITTER_MS));
                        publish(store.add_record(record, Instant::now(), jitter));
                    }
                    Some(CacheCommand::LookupOne { name, rtype, reply }) => {
                        let _ = reply.send(store.lookup_record(name.as_deref(), rtype));
                    }
                    Some(CacheCommand::LookupAll { name, rtype, reply }) => {
                        let _ = reply.send(store.lookup_records(name.as_deref(), rtype));
                    }
                    None => break,
                }
            }
            _ = sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {
                publish(store.expire(Instant::now()));
            }
        }
    }

    tracing::debug!("Cache task stopped with {} records", store.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{A, PTR};
    use tokio::time::sleep;

    fn record(ttl: u32) -> Record {
        Record {
            ttl,
            address: Some("10.0.0.2".parse().unwrap()),
            ..Record::new("host.local.", A)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_lifecycle() {
        let cache = CacheHandle::spawn();
        let mut events = cache.subscribe();
        cache.add_record(record(1));

        assert_eq!(cache.lookup_record(Some("host.local."), A).await, Some(record(1)));

        sleep(Duration::from_millis(600)).await;
        assert_eq!(events.try_recv().unwrap(), CacheEvent::ShouldQuery(record(1)));
        assert!(events.try_recv().is_err());

        sleep(Duration::from_millis(500)).await;
        assert_eq!(cache.lookup_record(Some("host.local."), A).await, None);
        let mut expired = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, CacheEvent::RecordExpired(_)) {
                expired += 1;
            }
        }
        assert_eq!(expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_goodbye_expires_immediately() {
        let cache = CacheHandle::spawn();
        let mut events = cache.subscribe();
        cache.add_record(record(120));
        cache.add_record(record(0));

        assert!(cache.lookup_records(None, A).await.is_empty());
        assert_eq!(events.recv().await.unwrap(), CacheEvent::RecordExpired(record(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_records() {
        let cache = CacheHandle::spawn();
        let other = cache.clone();
        other.add_record(Record {
            target: "a._http._tcp.local.".to_string(),
            ..Record::new("_http._tcp.local.", PTR)
        });
        assert_eq!(cache.lookup_records(Some("_http._tcp.local."), PTR).await.len(), 1);
        assert!(cache.lookup_record(Some("_ssh._tcp.local."), PTR).await.is_none());
    }
}
