//! Reverse Turing Server - authoritative vote-elimination game server
//!
//! This is the main entry point. It handles:
//! - WebSocket connections carrying votes and match events
//! - HTTP endpoints for creating matches, reading snapshots and spawning fish
//! - Reaping finished matches

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reverse_turing_server::app::AppState;
use reverse_turing_server::config::Config;
use reverse_turing_server::http::build_router;
use reverse_turing_server::util::time::init_server_time;

/// How often finished matches are checked for removal
const REAP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!("Starting Reverse Turing Server");
    info!("Server address: {}", config.server_addr);
    info!(rules = ?config.rules, "Match rules");

    let state = AppState::new(config.clone());

    // Spawn reaper for finished and abandoned matches
    let registry = state.registry.clone();
    let linger = config.match_linger;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAP_INTERVAL);
        loop {
            interval.tick().await;
            let reaped = registry.reap_stale(linger);
            if reaped > 0 {
                info!(reaped, active_matches = registry.active_matches(), "Reaped stale matches");
            }
        }
    });

    let router = build_router(state);

    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
