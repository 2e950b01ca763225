//! Authoritative server for a real-time top-down multiplayer arena.
//!
//! Clients speak a JSON frame protocol over a persistent WebSocket; the
//! server simulates physics, combat, pickups, buffs, match lifecycle,
//! streaks, and scoreboards on a fixed 30 Hz tick, and pushes derived
//! events plus projected HUD snapshots back out. Every simulation event is
//! journaled to durable, compressed files for replay and analysis.
//!
//! The simulation is single-threaded: one engine task owns the world and
//! every system that mutates it. Connections, HTTP, and journal I/O run on
//! their own tasks and talk to the engine over channels.

pub mod app;
pub mod bot;
pub mod config;
pub mod game;
pub mod http;
pub mod hud;
pub mod journal;
pub mod util;
pub mod ws;
