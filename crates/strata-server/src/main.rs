mod chunks;
mod config;
mod events;
mod mapping;
mod net;
mod persistence;
mod players;
mod session;
mod state;
mod tasks;
mod tick;
mod translator;

use std::sync::Arc;

use tracing::{error, info};

use config::ServerConfig;
use state::ServerState;

#[tokio::main]
async fn main() {
    let (config, from_file) = match ServerConfig::load_or_default("strata.toml") {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load strata.toml: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        "Strata v{} starting on {}",
        env!("CARGO_PKG_VERSION"),
        config.bind_addr()
    );
    if !from_file {
        info!("strata.toml not found, using defaults");
    }
    info!("MOTD: {}", config.server.motd);
    info!("Max players: {}", config.server.max_players);
    info!(
        "World: {} (seed: {})",
        config.world.directory, config.world.seed
    );

    let state = match ServerState::new(config) {
        Ok(state) => state,
        Err(e) => {
            error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let shutdown_tx_ctrlc = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        let _ = shutdown_tx_ctrlc.send(true);
    });

    let ticker = tokio::spawn(tick::run(Arc::clone(&state), shutdown_rx.clone()));

    if let Err(e) = net::listener::run(state, shutdown_rx).await {
        error!("listener failed: {e}");
        std::process::exit(1);
    }
    // The ticker saves on its way out; wait for that before exiting.
    ticker.await.ok();
    info!("Server shut down.");
}
