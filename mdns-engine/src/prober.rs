use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::time::{sleep, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::dns::{type_name, Message, Query, Record, ANY};
use crate::server::{recv_event, Server, ServerEvent};

/// How long a proposed name must go unchallenged
pub const PROBE_WINDOW: Duration = Duration::from_secs(2);

/// Claims a unique name for a record.
///
/// The record's first label is the base name; the rest is kept as is. The
/// prober announces `base.rest`, then `base-2.rest`, `base-3.rest` and so on
/// each time another host answers for the proposed name and type, and
/// confirms the first one that stays unchallenged for [`PROBE_WINDOW`].
pub struct Prober {
    confirmed: Option<oneshot::Receiver<String>>,
    _guard: DropGuard,
}

impl Prober {
    pub fn new(server: Arc<dyn Server>, record: Record) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let events = server.subscribe();
        tokio::spawn(run(server, events, record, tx, cancel.clone()));
        Self {
            confirmed: Some(rx),
            _guard: cancel.drop_guard(),
        }
    }

    /// Resolves with the confirmed name. Returns `None` if the prober stopped
    /// without confirming, or when called again after confirmation.
    pub async fn confirmed(&mut self) -> Option<String> {
        let rx = self.confirmed.as_mut()?;
        let name = rx.await.ok();
        self.confirmed = None;
        name
    }
}

/// Wait on an optional prober; pending forever when there is none.
pub(crate) async fn wait_confirmed(prober: &mut Option<Prober>) -> Option<String> {
    match prober {
        Some(prober) => prober.confirmed().await,
        None => std::future::pending().await,
    }
}

fn candidate_name(base: &str, rest: &str, suffix: u32) -> String {
    if suffix == 1 {
        format!("{}{}", base, rest)
    } else {
        format!("{}-{}{}", base, suffix, rest)
    }
}

fn send_probe(server: &dyn Server, proposed: &Record) {
    tracing::debug!("Probing for {} {}", proposed.name, type_name(proposed.rtype));
    let mut message = Message::new();
    message.add_query(Query::new(proposed.name.clone(), ANY));
    message.add_record(proposed.clone());
    server.send_message_to_all(&message);
}

/// Another host answered for the name we want
fn is_conflict(message: &Message, proposed: &Record) -> bool {
    message.is_response
        && message
            .records
            .iter()
            .any(|record| record.name == proposed.name && record.rtype == proposed.rtype)
}

async fn run(
    server: Arc<dyn Server>,
    mut events: broadcast::Receiver<ServerEvent>,
    mut proposed: Record,
    confirmed: oneshot::Sender<String>,
    cancel: CancellationToken,
) {
    let original = proposed.name.clone();
    let (base, rest) = match original.find('.') {
        Some(index) => original.split_at(index),
        None => (original.as_str(), ""),
    };

    let mut suffix = 1;
    proposed.name = candidate_name(base, rest, suffix);
    send_probe(server.as_ref(), &proposed);

    let window = sleep(PROBE_WINDOW);
    tokio::pin!(window);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = &mut window => {
                tracing::info!("Name confirmed: {}", proposed.name);
                let _ = confirmed.send(proposed.name);
                return;
            }
            event = recv_event(&mut events, "Prober") => {
                match event {
                    Some(ServerEvent::MessageReceived(message)) if is_conflict(&message, &proposed) => {
                        suffix += 1;
                        tracing::debug!(
                            "Conflict for {} {}, trying suffix {}",
                            proposed.name,
                            type_name(proposed.rtype),
                            suffix
                        );
                        proposed.name = candidate_name(base, rest, suffix);
                        send_probe(server.as_ref(), &proposed);
                        window.as_mut().reset(Instant::now() + PROBE_WINDOW);
                    }
                    Some(_) => {}
                    None => return,
                }
            }
        }
    }
}
