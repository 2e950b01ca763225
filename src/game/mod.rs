//! Game simulation modules

pub mod combat;
pub mod commands;
pub mod engine;
pub mod entities;
pub mod events;
pub mod r#match;
pub mod movement;
pub mod pickups;
pub mod spawn;
pub mod tasks;
pub mod world;

pub use engine::{Engine, EngineCommand, EngineStats, COMMAND_CHANNEL_CAPACITY};
