//! # Tannoy Server
//!
//! Channel-based message distribution for multiplayer backends.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! tannoy
//!
//! # Run with a config file in the search path
//! cp tannoy.toml /etc/tannoy/tannoy.toml && tannoy
//!
//! # Run with environment variables
//! TANNOY_PORT=3010 TANNOY_HOST=0.0.0.0 tannoy
//! ```

mod config;
mod error;
mod handlers;
mod link;
mod metrics;

use anyhow::Result;
use std::sync::Arc;
use tannoy_core::{ChannelService, MemoryStore, Router, ServiceConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tannoy=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;
    tracing::info!("Starting Tannoy server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    // Engine wiring: in-memory store, HTTP connector link, fan-out router.
    let store = Arc::new(MemoryStore::new());
    let connector_link = Arc::new(link::HttpConnectorLink::new(
        config.connectors.endpoints.clone(),
    )?);
    let service = ChannelService::new(
        store,
        Router::new(connector_link),
        ServiceConfig {
            max_msg_count: config.channels.max_msg_count,
        },
    );

    handlers::run_server(config, service).await?;

    Ok(())
}
