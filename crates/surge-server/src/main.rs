//! # Surge Server
//!
//! Realtime event-distribution server: authenticated WebSocket connections,
//! room-scoped subscriptions, and a Redis backplane for multi-process
//! deployments.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! surge
//!
//! # Run with environment variables
//! SURGE_PORT=8080 SURGE_HOST=0.0.0.0 surge
//! ```

mod auth;
mod config;
mod connection;
mod dispatch;
mod metrics;
mod server;

use anyhow::Result;
use auth::{JwtVerifier, TokenVerifier};
use server::AppState;
use std::sync::Arc;
use surge_backplane::{NullBackplane, RedisBackplane};
use surge_core::Backplane;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "surge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Surge server on {}:{}", config.host, config.port);

    // Initialize metrics
    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtVerifier::new(&config.auth.secret));

    // Connect the backplane. A failed or absent Redis never stops startup;
    // the server runs single-instance until the backplane comes up.
    let (backplane, inbound): (Arc<dyn Backplane>, _) = if config.backplane.enabled {
        let (backplane, inbound) = RedisBackplane::connect(config.backplane_config()).await;
        (backplane, Some(inbound))
    } else {
        tracing::info!("Backplane disabled, running single-instance");
        (Arc::new(NullBackplane::new()), None)
    };

    let state = Arc::new(AppState::new(config, backplane, verifier));

    // Pump peer-originated events into local delivery.
    if let Some(mut inbound) = inbound {
        let broadcaster = state.broadcaster.clone();
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                metrics::record_backplane_event();
                broadcaster.deliver_remote(&event.room, event.envelope);
            }
        });
    }

    // Start the server
    server::run_server(state).await?;

    Ok(())
}
