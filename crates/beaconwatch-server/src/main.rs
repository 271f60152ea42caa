//! # beaconwatch-server
//!
//! HTTP server for the beaconwatch beacon region monitor.
//!
//! This binary provides:
//! - REST API for region registration, monitoring control and notifications
//! - OpenAPI document at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, with the in-memory platform
//! cargo run --package beaconwatch-server
//!
//! # With BlueZ scanning
//! cargo run --package beaconwatch-server --features bluetooth
//! ```
//!
//! The configuration path is read from `BEACONWATCH_CONFIG`, falling back to
//! the platform default.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use anyhow::Context;
use beaconwatch_core::{default_config_path, Config};
use beaconwatch_server::api::create_router;
use beaconwatch_server::logging;
use beaconwatch_server::state::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("BEACONWATCH_CONFIG")
        .map_or_else(default_config_path, PathBuf::from);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let _logging = logging::init(&config.server)?;
    info!(config = %config_path.display(), "Starting beaconwatch-server");

    let (state, manager_task) = start_manager(&config).await?;

    if !config.regions.is_empty() {
        state.register_presets(&config.regions).await?;
        if let Err(e) = state.manager.start_monitoring().await {
            warn!(error = %e, "Could not start monitoring configured regions");
        }
    }

    let app = create_router(state);
    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("binding {}", config.server.bind_address))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager_task.abort();
    info!("beaconwatch-server stopped");
    Ok(())
}

#[cfg(feature = "bluetooth")]
async fn start_manager(
    config: &Config,
) -> anyhow::Result<(beaconwatch_server::state::SharedState, tokio::task::JoinHandle<()>)> {
    let (platform, scanner) = beaconwatch_core::BluezPlatform::connect(&config.bluetooth)
        .await
        .context("connecting to BlueZ")?;
    let (state, task) = AppState::start(platform, config.manager.clone());

    let sink = state.sink.clone();
    tokio::spawn(async move {
        if let Err(e) = scanner.run(sink).await {
            tracing::error!(error = %e, "Bluetooth scanner stopped");
        }
    });

    Ok((state, task))
}

#[cfg(not(feature = "bluetooth"))]
#[allow(clippy::unused_async)]
async fn start_manager(
    config: &Config,
) -> anyhow::Result<(beaconwatch_server::state::SharedState, tokio::task::JoinHandle<()>)> {
    warn!("Built without Bluetooth support; using the in-memory platform");
    Ok(AppState::start(
        beaconwatch_core::MockPlatform::new(),
        config.manager.clone(),
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
