use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use mdns_engine::{Browser, BrowserEvent, CacheHandle, Resolver, Server};
use serde::Serialize;
use shared::protocol::TXT_UUID;
use shared::types::Service;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{qualify_type, BrowseConfig};

/// Devices appearing, changing and leaving, keyed by their uuid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    Updated { uuid: String, service: Service },
    Resolved { uuid: String, address: IpAddr },
    Removed { uuid: String },
}

type RecvFuture = Pin<
    Box<
        dyn Future<Output = (usize, flume::Receiver<BrowserEvent>, Result<BrowserEvent, flume::RecvError>)>
            + Send,
    >,
>;

fn make_recv_future(idx: usize, rx: flume::Receiver<BrowserEvent>) -> RecvFuture {
    Box::pin(async move {
        let result = rx.recv_async().await;
        (idx, rx, result)
    })
}

/// The `uuid` TXT attribute, falling back to the instance name
pub fn device_uuid(service: &Service) -> String {
    service
        .attribute_str(TXT_UUID)
        .map(str::to_string)
        .unwrap_or_else(|| service.name.clone())
}

pub async fn run(
    server: Arc<dyn Server>,
    config: BrowseConfig,
    tx: flume::Sender<DeviceEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    if config.types.is_empty() {
        tracing::info!("No service types configured for browsing");
        cancel.cancelled().await;
        return Ok(());
    }

    let cache = CacheHandle::spawn();
    let resolve_timeout = Duration::from_millis(config.resolve_timeout_ms);

    let browsers: Vec<Browser> = config
        .types
        .iter()
        .map(|service_type| Browser::new(server.clone(), qualify_type(service_type), Some(cache.clone())))
        .collect();

    let mut type_futures: FuturesUnordered<RecvFuture> = FuturesUnordered::new();
    for (idx, browser) in browsers.iter().enumerate() {
        type_futures.push(make_recv_future(idx, browser.events()));
    }
    let mut resolving = JoinSet::new();

    loop {
        tokio::select! {
            Some((idx, rx, result)) = type_futures.next() => {
                match result {
                    Ok(BrowserEvent::Added(service)) | Ok(BrowserEvent::Updated(service)) => {
                        let uuid = device_uuid(&service);
                        if !service.hostname.is_empty() {
                            resolving.spawn(resolve(
                                server.clone(),
                                cache.clone(),
                                uuid.clone(),
                                service.hostname.clone(),
                                resolve_timeout,
                                tx.clone(),
                            ));
                        }
                        tx.send(DeviceEvent::Updated { uuid, service })
                            .context("Device event receiver dropped")?;
                        type_futures.push(make_recv_future(idx, rx));
                    }
                    Ok(BrowserEvent::Removed(service)) => {
                        tx.send(DeviceEvent::Removed { uuid: device_uuid(&service) })
                            .context("Device event receiver dropped")?;
                        type_futures.push(make_recv_future(idx, rx));
                    }
                    Err(e) => {
                        tracing::warn!("Browser {} disconnected: {}", idx, e);
                    }
                }
            }

            Some(result) = resolving.join_next() => {
                if let Err(e) = result {
                    tracing::warn!("Resolver task failed: {}", e);
                }
            }

            _ = cancel.cancelled() => {
                tracing::info!("Device enumerator shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Report the addresses of `hostname` until `timeout` runs out
async fn resolve(
    server: Arc<dyn Server>,
    cache: CacheHandle,
    uuid: String,
    hostname: String,
    timeout: Duration,
    tx: flume::Sender<DeviceEvent>,
) {
    let resolver = Resolver::new(server, hostname.as_str(), Some(cache));
    let resolved = resolver.resolved();
    let reported = tokio::time::timeout(timeout, async {
        while let Ok(address) = resolved.recv_async().await {
            let event = DeviceEvent::Resolved {
                uuid: uuid.clone(),
                address,
            };
            if tx.send(event).is_err() {
                break;
            }
        }
    })
    .await;
    if reported.is_err() {
        tracing::debug!("Stopped resolving {}", hostname);
    }
}
