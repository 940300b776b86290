//! # botherd-server
//!
//! Supervisor for automated game clients ("bots").
//!
//! This binary provides:
//! - **Bot registry** holding each bot's saved connection profile and its
//!   live session, persisted as a JSON file
//! - **Lifecycle control** with a TCP liveness probe before every connect
//!   attempt and automatic reconnects after unexpected disconnects
//! - **Bounded bot log** of recent lifecycle and chat events
//! - **REST API** (axum) to list, add, start, stop and delete bots

mod api;
mod config;
mod controller;
mod error;
mod log_buffer;
mod reconnect;
mod registry;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use botherd_net::TcpLinkClient;
use botherd_store::JsonFileStore;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::controller::BotController;
use crate::log_buffer::LogBuffer;
use crate::registry::BotRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,botherd_server=debug,botherd_net=debug")),
        )
        .init();

    info!("Starting botherd v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Restore saved bots and build the controller
    // -----------------------------------------------------------------------
    let log = LogBuffer::new(config.log_capacity);
    let store = Arc::new(JsonFileStore::new(config.bots_file.clone()));
    let registry = Arc::new(BotRegistry::load(store, log.clone()).await);
    info!(
        bots = registry.len().await,
        file = %config.bots_file.display(),
        "Bot registry ready"
    );

    let controller = BotController::new(
        registry,
        Arc::new(TcpLinkClient::new()),
        log,
        config.controller_settings(),
    );

    if config.auto_join {
        controller.start_all().await;
    }

    let app_state = AppState {
        controller: controller.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "HTTP server failed");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    controller.stop_all().await;
    result
}
