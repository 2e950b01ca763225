//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 30; // 30 ticks per second
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Upper bound on a single tick's delta time in seconds. A stall longer than
/// this resumes with one clamped tick instead of catching up.
pub const MAX_TICK_DELTA_SECS: f64 = 0.1;

/// ISO-8601 timestamp with colons replaced so it is filename-safe.
pub fn iso_for_filename(unix_ms: u64) -> String {
    let dt = chrono::DateTime::from_timestamp_millis(unix_ms as i64)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
    dt.format("%Y-%m-%dT%H-%M-%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_filename_has_no_colons() {
        let s = iso_for_filename(1_700_000_000_000);
        assert!(!s.contains(':'));
        assert!(s.starts_with("2023-11-14T"));
        assert!(s.ends_with('Z'));
    }
}
