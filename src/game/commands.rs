//! Client command validation and casting.
//!
//! Translates `cmd:*` inputs into world mutations and projectile spawns.
//! State-illegal commands (dead player, cooldown active, respawn before the
//! timer) are silently dropped per the error policy.

use std::collections::HashMap;

use rand_chacha::ChaCha8Rng;
use tracing::debug;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::entities::{Player, Projectile};
use crate::game::events::{EventQueue, GameEvent, ProjectileKind, Skill};
use crate::game::spawn::SpawnManager;
use crate::game::world::World;
use crate::util::vec2::Vec2;

/// Direction dedup tolerance for `cmd:move`
const MOVE_DIR_EPS: f64 = 1e-6;

/// Command application and its per-player bookkeeping
#[derive(Debug, Default)]
pub struct CommandSystem {
    /// Last movement direction accepted per player, for dedup
    last_move_dir: HashMap<Uuid, Vec2>,
}

impl CommandSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a player at a safe spawn and announce the join.
    pub fn join(
        &mut self,
        world: &mut World,
        spawn: &SpawnManager,
        rng: &mut ChaCha8Rng,
        cfg: &GameConfig,
        events: &mut EventQueue,
        now: u64,
        id: Uuid,
        name: String,
    ) {
        let pos = spawn.find_safe_spawn_position(world, rng);
        let player = Player::new(id, name.clone(), pos, cfg, now);
        events.emit(GameEvent::PlayerJoin {
            player_id: id,
            name,
            pos,
            hp: player.hp,
        });
        world.players.insert(id, player);
    }

    /// Remove the player from the world. Leave is a disconnect: stats and
    /// streaks are untouched and only `player:leave` goes out.
    pub fn leave(&mut self, world: &mut World, events: &mut EventQueue, id: Uuid) {
        if world.players.remove(&id).is_some() {
            self.last_move_dir.remove(&id);
            events.emit(GameEvent::PlayerLeave { player_id: id });
        }
    }

    /// Set movement velocity from a direction. Repeats of the same direction
    /// are dropped.
    pub fn apply_move(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        now: u64,
        id: Uuid,
        dir: Vec2,
    ) {
        let Some(player) = world.players.get_mut(&id) else {
            return;
        };
        if player.is_dead {
            return;
        }

        if self
            .last_move_dir
            .get(&id)
            .is_some_and(|last| last.approx_eq(dir, MOVE_DIR_EPS))
        {
            return;
        }
        self.last_move_dir.insert(id, dir);

        let speed = cfg.player.speed
            * if player.hasted(now) {
                player.haste_factor
            } else {
                1.0
            };
        player.vel = dir.normalized() * speed;
    }

    /// Set the aim target and echo it immediately for responsiveness; the
    /// facing still rotates toward it at the turn rate during integration.
    pub fn apply_aim(&mut self, world: &mut World, events: &mut EventQueue, id: Uuid, dir: Vec2) {
        let Some(player) = world.players.get_mut(&id) else {
            return;
        };
        if player.is_dead || dir.is_zero() {
            return;
        }

        let target = dir.normalized();
        player.face_target = target;
        events.emit(GameEvent::PlayerAimed {
            player_id: id,
            dir: target,
        });
    }

    /// Cast a skill, honoring its cooldown.
    pub fn cast(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        events: &mut EventQueue,
        now: u64,
        id: Uuid,
        skill: Skill,
    ) {
        let Some(player) = world.players.get_mut(&id) else {
            return;
        };
        if player.is_dead || !player.cooldown_free(skill, now) {
            return;
        }

        match skill {
            Skill::Shoot => {
                player.set_cooldown(skill, now, cfg.cooldowns.shoot);
                let dir = fire_direction(player);
                let pos = player.pos;
                player.stats.shots_fired += 1;
                spawn_projectile(world, events, id, ProjectileKind::Bullet, pos, dir, cfg, now);
            }
            Skill::Shotgun => {
                player.set_cooldown(skill, now, cfg.cooldowns.shotgun);
                let dir = fire_direction(player);
                let pos = player.pos;
                let count = cfg.projectiles.pellet.count;
                let spread = cfg.projectiles.pellet.spread;
                player.stats.shots_fired += count;

                for i in 0..count {
                    // Even fan across ±spread; a single pellet flies straight.
                    let t = if count == 1 {
                        0.0
                    } else {
                        i as f64 / (count - 1) as f64 * 2.0 - 1.0
                    };
                    let pellet_dir = dir.rotated(t * spread);
                    spawn_projectile(
                        world,
                        events,
                        id,
                        ProjectileKind::Pellet,
                        pos,
                        pellet_dir,
                        cfg,
                        now,
                    );
                }
            }
            Skill::Rocket => {
                player.set_cooldown(skill, now, cfg.cooldowns.rocket);
                let dir = fire_direction(player);
                let pos = player.pos;
                player.stats.shots_fired += 1;
                spawn_projectile(world, events, id, ProjectileKind::Rocket, pos, dir, cfg, now);
            }
            Skill::Dash => {
                player.set_cooldown(skill, now, cfg.cooldowns.dash);
                player.dash_until = now + cfg.dash.duration_ms;
                player.iframe_until = now + cfg.dash.duration_ms;
                player.dash_factor = cfg.dash.factor;
                events.emit(GameEvent::DashStarted {
                    player_id: id,
                    duration: cfg.dash.duration_ms,
                    iframes: true,
                });
            }
        }
    }

    /// Respawn after death once the lockout has elapsed. Resets the body,
    /// preserves match stats, and re-signals presence with `player:join`.
    pub fn respawn(
        &mut self,
        world: &mut World,
        spawn: &SpawnManager,
        rng: &mut ChaCha8Rng,
        cfg: &GameConfig,
        events: &mut EventQueue,
        now: u64,
        id: Uuid,
        dead_until: &HashMap<Uuid, u64>,
    ) {
        let Some(player) = world.players.get(&id) else {
            return;
        };
        if !player.is_dead {
            return;
        }
        if dead_until.get(&id).is_some_and(|&until| now < until) {
            debug!(player_id = %id, "respawn before lockout expiry, dropped");
            return;
        }

        let pos = spawn.find_safe_spawn_position(world, rng);
        let Some(player) = world.players.get_mut(&id) else {
            return;
        };
        player.respawn_at(pos, cfg);
        self.last_move_dir.remove(&id);

        events.emit(GameEvent::PlayerJoin {
            player_id: id,
            name: player.name.clone(),
            pos,
            hp: player.hp,
        });
    }
}

/// Firing direction: facing, falling back to travel direction, then `(1, 0)`
fn fire_direction(player: &Player) -> Vec2 {
    if !player.face.is_zero() {
        player.face
    } else if !player.vel.is_zero() {
        player.vel.normalized()
    } else {
        Vec2::new(1.0, 0.0)
    }
}

fn spawn_projectile(
    world: &mut World,
    events: &mut EventQueue,
    owner: Uuid,
    kind: ProjectileKind,
    pos: Vec2,
    dir: Vec2,
    cfg: &GameConfig,
    now: u64,
) {
    let projectile = Projectile::new(owner, kind, pos, dir, &cfg.projectiles, now);
    events.emit(GameEvent::ProjectileSpawned {
        id: projectile.id,
        owner,
        kind,
        pos: projectile.pos,
        vel: projectile.vel,
    });
    world.projectiles.insert(projectile.id, projectile);
}
