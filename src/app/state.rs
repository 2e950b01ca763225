//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::game::{EngineCommand, EngineStats};
use crate::ws::registry::ConnectionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    /// Channel into the engine task
    pub commands: mpsc::Sender<EngineCommand>,
    pub stats: Arc<EngineStats>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<ConnectionRegistry>,
        commands: mpsc::Sender<EngineCommand>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            config,
            registry,
            commands,
            stats,
        }
    }
}
