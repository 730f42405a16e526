mod config;
mod enumerator;
mod transport;

use std::sync::Arc;

use anyhow::{Context, Result};
use mdns_engine::{Hostname, Provider, ProviderEvent, Server};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::transport::UdpServer;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mdnsd=info,mdns_engine=info")),
        )
        .init();

    tracing::info!("Starting mdnsd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/mdnsd/mdnsd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let udp = UdpServer::start(&config.server, cancel.clone()).context("Failed to start mDNS transport")?;
    let server: Arc<dyn Server> = udp;

    let hostname = match &config.host.name {
        Some(name) => Hostname::with_name(server.clone(), name),
        None => Hostname::new(server.clone()).context("Failed to read system hostname")?,
    };

    let mut names = hostname.subscribe();
    let names_cancel = cancel.clone();
    let hostname_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = names.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(name) = names.borrow_and_update().clone() {
                        tracing::info!("Hostname is {}", name);
                    }
                }
                _ = names_cancel.cancelled() => break,
            }
        }
    });

    // One provider per configured service
    let mut providers = Vec::new();
    let mut provider_handles = Vec::new();
    for service in &config.services {
        let provider = Provider::new(server.clone(), &hostname);
        provider.update(service.to_service());

        let events = provider.events();
        let events_cancel = cancel.clone();
        provider_handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv_async() => match event {
                        Ok(ProviderEvent::Published(name)) => tracing::info!("Published {}", name),
                        Ok(ProviderEvent::TransportError(e)) => tracing::warn!("Transport error: {}", e),
                        Err(_) => break,
                    },
                    _ = events_cancel.cancelled() => break,
                }
            }
        }));
        providers.push(provider);
    }

    // Spawn device enumerator task
    let (device_tx, device_rx) = flume::unbounded();
    let enum_cancel = cancel.clone();
    let enum_server = server.clone();
    let enum_config = config.browse.clone();
    let enum_handle = tokio::spawn(async move {
        if let Err(e) = enumerator::run(enum_server, enum_config, device_tx, enum_cancel).await {
            tracing::error!("Device enumerator error: {}", e);
        }
    });

    // Print device events as JSON lines
    let printer_handle = tokio::spawn(async move {
        while let Ok(event) = device_rx.recv_async().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!("Failed to serialize device event: {}", e),
            }
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Send farewells before the transport goes away
    for provider in providers {
        provider.shutdown().await;
    }

    // Wait for all tasks to complete
    let _ = tokio::join!(hostname_handle, enum_handle, printer_handle);
    for handle in provider_handles {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
