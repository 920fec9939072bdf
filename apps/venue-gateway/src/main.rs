//! Venue gateway binary.
//!
//! Wires configuration, telemetry, the gateway facade, and the HTTP
//! surface together, then runs until ctrl-c.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use venue_gateway::config::load_config;
use venue_gateway::gateway::VenueGateway;
use venue_gateway::persistence::InMemoryTradeStore;
use venue_gateway::server;
use venue_gateway::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    let _telemetry_guard = init_telemetry();

    let config_path =
        std::env::var("VENUE_GATEWAY_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = load_config(&config_path)?;
    let http_port = config.server.http_port;

    let gateway = VenueGateway::new(config, Arc::new(InMemoryTradeStore::new()));

    // Initial connect is best effort; the facade exposes /connect and the
    // supervisor reconnects after drops
    if let Err(err) = gateway.connect().await {
        tracing::warn!(error = %err, "initial venue connection failed, starting disconnected");
    }

    let shutdown = CancellationToken::new();
    let server_task = {
        let gateway = gateway.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server::serve(gateway, http_port, shutdown).await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    shutdown.cancel();
    gateway.disconnect().await;
    server_task.await??;

    tracing::info!("venue gateway stopped");
    Ok(())
}
