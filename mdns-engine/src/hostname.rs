use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::dns::{Bitmap, Message, Record, A, AAAA, ANY, NSEC};
use crate::prober::{wait_confirmed, Prober};
use crate::server::{recv_event, Server, ServerEvent};

/// TTL of the address records we hand out
pub const ADDRESS_TTL: u32 = 120;
/// A confirmed hostname is probed again after this long
pub const REASSERT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Label used when the configured name has nothing left after sanitising
const FALLBACK_NAME: &str = "device";
const MAX_LABEL_BYTES: usize = 63;

/// Turn `name` into a single label under `.local.`
fn local_name(name: &str) -> String {
    let mut label = name.trim_matches('.').replace('.', "-");
    if label.len() > MAX_LABEL_BYTES {
        let mut end = MAX_LABEL_BYTES;
        while !label.is_char_boundary(end) {
            end -= 1;
        }
        label.truncate(end);
    }
    if label.is_empty() {
        tracing::warn!("Hostname {:?} is not usable, claiming {:?}", name, FALLBACK_NAME);
        label = FALLBACK_NAME.to_string();
    }
    format!("{}.local.", label)
}

/// Claims `<name>.local.` for this device and answers address queries for it.
pub struct Hostname {
    names: watch::Receiver<Option<String>>,
    registered: Arc<AtomicBool>,
    _guard: DropGuard,
}

impl Hostname {
    /// Claim a name derived from the system hostname
    pub fn new(server: Arc<dyn Server>) -> io::Result<Self> {
        let name = hostname::get()?;
        Ok(Self::with_name(server, &name.to_string_lossy()))
    }

    /// Claim a name derived from `name`; dots are replaced so the result is a
    /// single label under `.local.`
    pub fn with_name(server: Arc<dyn Server>, name: &str) -> Self {
        let cancel = CancellationToken::new();
        let (names_tx, names) = watch::channel(None);
        let registered = Arc::new(AtomicBool::new(false));
        let task = HostnameTask {
            events: server.subscribe(),
            server,
            proposed: local_name(name),
            current: None,
            names: names_tx,
            registered: registered.clone(),
        };
        tokio::spawn(task.run(cancel.clone()));
        Self {
            names,
            registered,
            _guard: cancel.drop_guard(),
        }
    }

    /// Whether the current name is confirmed and being defended
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// The last confirmed hostname, `None` until the first confirmation
    pub fn hostname(&self) -> Option<String> {
        self.names.borrow().clone()
    }

    /// Notified each time the confirmed hostname changes
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.names.clone()
    }
}

struct HostnameTask {
    server: Arc<dyn Server>,
    events: broadcast::Receiver<ServerEvent>,
    /// Name asked for, before any conflict suffix
    proposed: String,
    /// Name confirmed and currently answered for
    current: Option<String>,
    names: watch::Sender<Option<String>>,
    registered: Arc<AtomicBool>,
}

impl HostnameTask {
    async fn run(mut self, cancel: CancellationToken) {
        let mut prober = Some(self.start_probe());
        let reassert = sleep(REASSERT_INTERVAL);
        tokio::pin!(reassert);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                confirmed = wait_confirmed(&mut prober) => {
                    prober = None;
                    match confirmed {
                        Some(name) => {
                            self.on_confirmed(name);
                            reassert.as_mut().reset(Instant::now() + REASSERT_INTERVAL);
                        }
                        None => tracing::warn!("Hostname prober stopped without confirming"),
                    }
                }
                _ = &mut reassert, if prober.is_none() => {
                    tracing::debug!("Re-asserting hostname {}", self.proposed);
                    self.registered.store(false, Ordering::Release);
                    self.current = None;
                    prober = Some(self.start_probe());
                    reassert.as_mut().reset(Instant::now() + REASSERT_INTERVAL);
                }
                event = recv_event(&mut self.events, "Hostname") => {
                    match event {
                        Some(ServerEvent::MessageReceived(message)) if !message.is_response => {
                            self.answer(&message);
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        }
    }

    fn start_probe(&self) -> Prober {
        let address = self
            .server
            .local_addresses(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .into_iter()
            .find(IpAddr::is_ipv4)
            // Only the name and type matter to the probe
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let record = Record {
            address: Some(address),
            ttl: ADDRESS_TTL,
            ..Record::new(self.proposed.clone(), A)
        };
        Prober::new(self.server.clone(), record)
    }

    fn on_confirmed(&mut self, name: String) {
        self.current = Some(name.clone());
        self.registered.store(true, Ordering::Release);
        self.names.send_if_modified(|current| {
            if current.as_deref() == Some(name.as_str()) {
                return false;
            }
            tracing::info!("Hostname registered: {}", name);
            *current = Some(name);
            true
        });
    }

    fn answer(&self, message: &Message) {
        let Some(hostname) = self.current.as_deref() else {
            return;
        };

        let addresses = self.server.local_addresses(message.address);
        let mut reply = Message::reply(message);

        for query in message.queries.iter().filter(|query| query.name == hostname) {
            if !matches!(query.rtype, A | AAAA | ANY) {
                continue;
            }
            let mut found = false;
            for address in &addresses {
                let rtype = if address.is_ipv4() { A } else { AAAA };
                if query.rtype != ANY && query.rtype != rtype {
                    continue;
                }
                found = true;
                let record = Record {
                    flush_cache: true,
                    ttl: ADDRESS_TTL,
                    address: Some(*address),
                    ..Record::new(hostname, rtype)
                };
                if !reply.records.contains(&record) {
                    reply.add_record(record);
                }
            }
            if !found && query.rtype != ANY {
                let present: Vec<u16> = addresses
                    .iter()
                    .map(|address| if address.is_ipv4() { A } else { AAAA })
                    .collect();
                let nsec = Record {
                    flush_cache: true,
                    ttl: ADDRESS_TTL,
                    next_domain_name: hostname.to_string(),
                    bitmap: Bitmap::from_types(&present),
                    ..Record::new(hostname, NSEC)
                };
                if !reply.records.contains(&nsec) {
                    reply.add_record(nsec);
                }
            }
        }

        if !reply.records.is_empty() {
            tracing::debug!("Answering {} for {}", hostname, message.address);
            self.server.send_message(&reply);
        }
    }
}
