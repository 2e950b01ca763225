//! Authoritative world state: entity maps, bounds, and the obstacle layout.
//!
//! The world carries no business logic; systems mutate it on the engine
//! task. Everything is keyed by id so cross-component references never hold
//! pointers into the maps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::entities::{Pickup, Player, Projectile};
use crate::util::vec2::Vec2;

/// Static axis-aligned obstacle
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Obstacle {
    #[serde(rename = "type")]
    pub shape: ObstacleShape,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleShape {
    Rect,
}

impl Obstacle {
    pub fn rect(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            shape: ObstacleShape::Rect,
            x,
            y,
            w,
            h,
        }
    }

    /// Inclusive point-in-rect test
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x <= self.x + self.w && p.y >= self.y && p.y <= self.y + self.h
    }

    /// Closest point of the rect to `p`
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x.clamp(self.x, self.x + self.w),
            p.y.clamp(self.y, self.y + self.h),
        )
    }
}

/// World rectangle
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= 0.0 && p.x <= self.width && p.y >= 0.0 && p.y <= self.height
    }

    /// Clamp a circle center so the circle stays inside the rectangle
    pub fn clamp_circle(&self, p: Vec2, radius: f64) -> Vec2 {
        Vec2::new(
            p.x.clamp(radius, (self.width - radius).max(radius)),
            p.y.clamp(radius, (self.height - radius).max(radius)),
        )
    }
}

/// The three entity maps plus static geometry
#[derive(Debug)]
pub struct World {
    pub bounds: Bounds,
    pub obstacles: Vec<Obstacle>,
    pub players: HashMap<Uuid, Player>,
    pub projectiles: HashMap<Uuid, Projectile>,
    pub pickups: HashMap<Uuid, Pickup>,
}

impl World {
    pub fn new(cfg: &GameConfig) -> Self {
        Self {
            bounds: Bounds {
                width: cfg.world.width,
                height: cfg.world.height,
            },
            obstacles: default_obstacles(cfg.world.width, cfg.world.height),
            players: HashMap::new(),
            projectiles: HashMap::new(),
            pickups: HashMap::new(),
        }
    }

    pub fn live_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.is_alive())
    }

    pub fn live_player_count(&self) -> usize {
        self.players.values().filter(|p| p.is_alive()).count()
    }

    /// Is the point inside any obstacle rect (inclusive)?
    pub fn blocked(&self, p: Vec2) -> bool {
        self.obstacles.iter().any(|o| o.contains(p))
    }
}

/// The shipped arena layout: a center block, two side walls, and four
/// corner pillars, proportional to the world rectangle.
pub fn default_obstacles(width: f64, height: f64) -> Vec<Obstacle> {
    vec![
        // Center block
        Obstacle::rect(width * 0.44, height * 0.40, width * 0.12, height * 0.20),
        // Upper and lower mid walls
        Obstacle::rect(width * 0.20, height * 0.15, width * 0.25, height * 0.03),
        Obstacle::rect(width * 0.55, height * 0.82, width * 0.25, height * 0.03),
        // Side pillars
        Obstacle::rect(width * 0.12, height * 0.60, width * 0.04, height * 0.18),
        Obstacle::rect(width * 0.84, height * 0.22, width * 0.04, height * 0.18),
        // Corner nubs
        Obstacle::rect(width * 0.05, height * 0.05, width * 0.05, height * 0.08),
        Obstacle::rect(width * 0.90, height * 0.87, width * 0.05, height * 0.08),
    ]
}
