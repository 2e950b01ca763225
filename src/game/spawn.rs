//! Safe spawn position selection.
//!
//! Rejection sampling inside the inner rectangle, keeping clear of
//! obstacles and live players, with a distance-maximizing fallback and a
//! fixed emergency ladder when the field is crowded.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use crate::game::world::World;
use crate::util::vec2::Vec2;

/// Inner-rectangle margins, in world units
#[derive(Debug, Clone, Copy)]
pub struct SpawnMargins {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SpawnConfig {
    pub margins: SpawnMargins,
    pub min_distance_from_players: f64,
    pub max_attempts: u32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            margins: SpawnMargins {
                left: 80.0,
                right: 80.0,
                top: 80.0,
                bottom: 80.0,
            },
            min_distance_from_players: 200.0,
            max_attempts: 32,
        }
    }
}

/// Number of fallback samples scored by distance to the nearest live player
const FALLBACK_SAMPLES: u32 = 16;

pub struct SpawnManager {
    cfg: SpawnConfig,
}

impl SpawnManager {
    pub fn new(cfg: SpawnConfig) -> Self {
        Self { cfg }
    }

    fn inner_rect(&self, world: &World) -> (f64, f64, f64, f64) {
        let m = &self.cfg.margins;
        (
            m.left,
            m.top,
            (world.bounds.width - m.right).max(m.left),
            (world.bounds.height - m.bottom).max(m.top),
        )
    }

    /// Inside the inner rectangle?
    pub fn is_within_spawn_bounds(&self, world: &World, p: Vec2) -> bool {
        let (x0, y0, x1, y1) = self.inner_rect(world);
        p.x >= x0 && p.x <= x1 && p.y >= y0 && p.y <= y1
    }

    /// Uniform sample from the inner rectangle
    pub fn random_position(&self, world: &World, rng: &mut ChaCha8Rng) -> Vec2 {
        let (x0, y0, x1, y1) = self.inner_rect(world);
        Vec2::new(rng.gen_range(x0..=x1), rng.gen_range(y0..=y1))
    }

    /// Inside any obstacle rect (inclusive)?
    pub fn is_position_blocked(&self, world: &World, p: Vec2) -> bool {
        world.blocked(p)
    }

    fn distance_to_nearest_live_player(&self, world: &World, p: Vec2) -> f64 {
        world
            .live_players()
            .map(|pl| pl.pos.distance_to(p))
            .fold(f64::INFINITY, f64::min)
    }

    fn is_safe(&self, world: &World, p: Vec2) -> bool {
        self.is_within_spawn_bounds(world, p)
            && !self.is_position_blocked(world, p)
            && self.distance_to_nearest_live_player(world, p)
                >= self.cfg.min_distance_from_players
    }

    /// Find a position satisfying bounds, obstacle, and player-distance
    /// constraints. Falls back to the most distant unblocked sample, then a
    /// fixed emergency ladder; the very last resort is the world center even
    /// if blocked.
    pub fn find_safe_spawn_position(&self, world: &World, rng: &mut ChaCha8Rng) -> Vec2 {
        for _ in 0..self.cfg.max_attempts {
            let candidate = self.random_position(world, rng);
            if self.is_safe(world, candidate) {
                return candidate;
            }
        }

        // Among additional unblocked samples, take the one farthest from
        // any live player.
        let mut best: Option<(Vec2, f64)> = None;
        for _ in 0..FALLBACK_SAMPLES {
            let candidate = self.random_position(world, rng);
            if self.is_position_blocked(world, candidate) {
                continue;
            }
            let dist = self.distance_to_nearest_live_player(world, candidate);
            if best.map_or(true, |(_, d)| dist > d) {
                best = Some((candidate, dist));
            }
        }
        if let Some((pos, _)) = best {
            return pos;
        }

        // Emergency ladder: center, then corner-inset points.
        let (x0, y0, x1, y1) = self.inner_rect(world);
        let center = Vec2::new((x0 + x1) / 2.0, (y0 + y1) / 2.0);
        let emergencies = [
            center,
            Vec2::new(x0, y0),
            Vec2::new(x1, y0),
            Vec2::new(x0, y1),
            Vec2::new(x1, y1),
        ];
        for p in emergencies {
            if !self.is_position_blocked(world, p) {
                return p;
            }
        }

        warn!("no unblocked spawn position found, using world center");
        center
    }

    /// Clamp each point into the inner rectangle
    pub fn adjust_spawn_points_to_margins(&self, world: &World, points: &mut [Vec2]) {
        let (x0, y0, x1, y1) = self.inner_rect(world);
        for p in points {
            p.x = p.x.clamp(x0, x1);
            p.y = p.y.clamp(y0, y1);
        }
    }
}

impl Default for SpawnManager {
    fn default() -> Self {
        Self::new(SpawnConfig::default())
    }
}
