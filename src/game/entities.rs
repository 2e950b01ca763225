//! World-owned entity records: players, projectiles, pickups.
//!
//! Cross-references between entities are ids, never pointers; everything
//! lives in the [`World`](super::world::World) maps. Timed effects are
//! absolute expiry timestamps on the player record — `0` means inactive.

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::{GameConfig, ProjectileConfig};
use crate::game::events::{PickupKind, ProjectileKind, Skill};
use crate::util::vec2::Vec2;

/// Per-match player statistics
#[derive(Debug, Clone, Default)]
pub struct PlayerStats {
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub current_streak: u32,
    pub best_streak: u32,
    pub damage_dealt: f64,
    pub damage_taken: f64,
    pub shots_fired: u32,
    pub shots_hit: u32,
    pub match_start_time: u64,
    pub last_kill_time: Option<u64>,
    pub last_death_time: Option<u64>,
}

impl PlayerStats {
    /// Reset for a new match, keeping only the new start time.
    pub fn reset(&mut self, now: u64) {
        *self = PlayerStats {
            match_start_time: now,
            ..PlayerStats::default()
        };
    }
}

/// Time-bounded extra velocity from a hit or explosion
#[derive(Debug, Clone, Copy)]
pub struct Knockback {
    pub vx: f64,
    pub vy: f64,
    pub until: u64,
}

/// Authoritative player record
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub name: String,

    pub pos: Vec2,
    pub vel: Vec2,
    /// Current facing, unit length
    pub face: Vec2,
    /// Where the player wants to face; `face` rotates toward it at the
    /// configured turn rate
    pub face_target: Vec2,

    pub hp: f64,
    /// Absolute expiry timestamp (ms) per skill; a missing entry or a past
    /// timestamp means the cooldown is free
    pub cooldowns: HashMap<Skill, u64>,

    // Timed effect flags, absolute expiry ms; 0 = inactive
    pub iframe_until: u64,
    pub dash_until: u64,
    pub haste_until: u64,
    pub shield_until: u64,
    pub knockback: Option<Knockback>,

    pub dash_factor: f64,
    pub haste_factor: f64,

    pub stats: PlayerStats,

    pub is_dead: bool,
    pub died_at: Option<u64>,

    /// Server-driven player; gets no private frames
    pub is_bot: bool,
}

impl Player {
    pub fn new(id: Uuid, name: String, pos: Vec2, cfg: &GameConfig, now: u64) -> Self {
        Self {
            id,
            name,
            pos,
            vel: Vec2::ZERO,
            face: Vec2::new(1.0, 0.0),
            face_target: Vec2::new(1.0, 0.0),
            hp: cfg.player.hp,
            cooldowns: HashMap::new(),
            iframe_until: 0,
            dash_until: 0,
            haste_until: 0,
            shield_until: 0,
            knockback: None,
            dash_factor: 1.0,
            haste_factor: 1.0,
            stats: PlayerStats {
                match_start_time: now,
                ..PlayerStats::default()
            },
            is_dead: false,
            died_at: None,
            is_bot: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.is_dead
    }

    pub fn cooldown_free(&self, skill: Skill, now: u64) -> bool {
        self.cooldowns.get(&skill).map_or(true, |&until| until <= now)
    }

    pub fn set_cooldown(&mut self, skill: Skill, now: u64, duration_ms: u64) {
        self.cooldowns.insert(skill, now + duration_ms);
    }

    pub fn dashing(&self, now: u64) -> bool {
        self.dash_until > now
    }

    pub fn hasted(&self, now: u64) -> bool {
        self.haste_until > now
    }

    pub fn shielded(&self, now: u64) -> bool {
        self.shield_until > now
    }

    pub fn invulnerable(&self, now: u64) -> bool {
        self.iframe_until > now
    }

    /// Reset to a live state at `pos`, preserving match stats.
    pub fn respawn_at(&mut self, pos: Vec2, cfg: &GameConfig) {
        self.pos = pos;
        self.vel = Vec2::ZERO;
        self.hp = cfg.player.hp;
        self.cooldowns.clear();
        self.iframe_until = 0;
        self.dash_until = 0;
        self.haste_until = 0;
        self.shield_until = 0;
        self.knockback = None;
        self.dash_factor = 1.0;
        self.haste_factor = 1.0;
        self.is_dead = false;
        self.died_at = None;
    }
}

/// Authoritative projectile record
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    pub owner: Uuid,
    pub kind: ProjectileKind,

    pub pos: Vec2,
    pub vel: Vec2,
    pub hit_radius: f64,
    /// Mutable: reduced by the dropoff factor on every bounce
    pub damage: f64,
    pub lifetime_ms: u64,
    pub spawn_time: u64,

    pub bounce_count: u32,
    pub max_bounces: u32,
    pub damage_dropoff: f64,
    pub velocity_retention: f64,
}

impl Projectile {
    pub fn new(
        owner: Uuid,
        kind: ProjectileKind,
        pos: Vec2,
        dir: Vec2,
        cfg: &ProjectileConfig,
        now: u64,
    ) -> Self {
        let dir = dir.normalized_or_unit_x();
        match kind {
            ProjectileKind::Bullet => Self {
                id: Uuid::new_v4(),
                owner,
                kind,
                pos,
                vel: dir * cfg.base_speed,
                hit_radius: cfg.hit_radius,
                damage: cfg.bullet.damage,
                lifetime_ms: cfg.bullet.lifetime_ms,
                spawn_time: now,
                bounce_count: 0,
                max_bounces: cfg.bullet.max_bounces,
                damage_dropoff: cfg.bullet.damage_dropoff,
                velocity_retention: cfg.bullet.velocity_retention,
            },
            ProjectileKind::Pellet => Self {
                id: Uuid::new_v4(),
                owner,
                kind,
                pos,
                vel: dir * cfg.base_speed,
                hit_radius: cfg.hit_radius,
                damage: cfg.pellet.damage,
                lifetime_ms: cfg.pellet.lifetime_ms,
                spawn_time: now,
                bounce_count: 0,
                max_bounces: cfg.pellet.max_bounces,
                damage_dropoff: cfg.pellet.damage_dropoff,
                velocity_retention: cfg.pellet.velocity_retention,
            },
            ProjectileKind::Rocket => Self {
                id: Uuid::new_v4(),
                owner,
                kind,
                pos,
                vel: dir * cfg.rocket.speed,
                hit_radius: cfg.rocket.hit_radius,
                damage: cfg.rocket.damage,
                lifetime_ms: cfg.rocket.lifetime_ms,
                spawn_time: now,
                bounce_count: 0,
                max_bounces: 0,
                damage_dropoff: 1.0,
                velocity_retention: 1.0,
            },
        }
    }

    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.spawn_time)
    }

    pub fn expired(&self, now: u64) -> bool {
        self.age_ms(now) >= self.lifetime_ms
    }

    /// Damage after bounce dropoff
    pub fn current_damage(&self) -> f64 {
        self.damage
    }

    /// Reflect off a surface normal, bleeding speed and damage. Returns
    /// false when the projectile has no bounces left.
    pub fn bounce(&mut self, normal: Vec2) -> bool {
        self.vel = self.vel.reflected(normal) * self.velocity_retention;
        self.damage *= self.damage_dropoff;
        self.bounce_count += 1;
        self.bounce_count <= self.max_bounces
    }
}

/// Collectible pickup on the field
#[derive(Debug, Clone)]
pub struct Pickup {
    pub id: Uuid,
    pub pos: Vec2,
    pub kind: PickupKind,
}
