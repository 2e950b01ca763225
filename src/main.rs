//! Arena Server - Authoritative multiplayer arena server
//!
//! This is the main entry point for the game server. It handles:
//! - WebSocket connections for real-time gameplay
//! - The fixed-tick simulation engine
//! - Event journaling to durable, compressed files
//! - A health endpoint for deployment probes

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_server::app::AppState;
use arena_server::config::Config;
use arena_server::game::{Engine, EngineCommand, EngineStats, COMMAND_CHANNEL_CAPACITY};
use arena_server::http::build_router;
use arena_server::journal::{spawn_journal_writer, JournalStorage};
use arena_server::util::time::{init_server_time, unix_millis};
use arena_server::ws::registry::ConnectionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration (fails fast on invalid gameplay tuning)
    let config = Arc::new(Config::from_env()?);

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Arena Server");
    info!("Server address: {}", config.server_addr);

    // Journal writer: owns the storage directory and does the blocking file
    // work off the simulation loop.
    let (journal_tx, journal_handle) = if config.journal.disabled {
        info!("journal disabled via environment");
        (None, None)
    } else {
        match JournalStorage::new(&config.journal) {
            Ok(storage) => {
                info!(dir = %config.journal.base_dir.display(), "journal storage ready");
                let (tx, handle) = spawn_journal_writer(storage);
                (Some(tx), Some(handle))
            }
            Err(e) => {
                // Journal I/O trouble never stops the simulation.
                warn!(error = %e, "journal storage unavailable, continuing without");
                (None, None)
            }
        }
    };

    // Engine wiring: connection registry, command channel, stats.
    let registry = Arc::new(ConnectionRegistry::new());
    let (command_tx, command_rx) = mpsc::channel::<EngineCommand>(COMMAND_CHANNEL_CAPACITY);
    let stats = Arc::new(EngineStats::default());

    let engine = Engine::new(
        config.clone(),
        registry.clone(),
        command_rx,
        journal_tx,
        stats.clone(),
        unix_millis(),
    );
    let engine_handle = tokio::spawn(engine.run());

    // Build router
    let state = AppState::new(config.clone(), registry, command_tx.clone(), stats);
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the engine; it saves the journal before acknowledging.
    let (ack_tx, ack_rx) = oneshot::channel();
    if command_tx
        .send(EngineCommand::Shutdown { ack: ack_tx })
        .await
        .is_ok()
    {
        let _ = ack_rx.await;
    }
    drop(command_tx);
    let _ = engine_handle.await;

    // Let the writer drain any queued saves.
    if let Some(handle) = journal_handle {
        let _ = handle.await;
    }

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
