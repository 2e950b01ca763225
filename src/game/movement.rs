//! Movement integration and collision resolution.
//!
//! Runs on the pre phase of every tick: integrates live players (knockback,
//! dash, substepped circle-vs-rect resolution, turn-rate-limited aim) and
//! steps projectiles (bounce, explode, despawn). Position broadcasts are
//! deduped against the last sent values, with a periodic heartbeat to heal
//! lost updates.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::events::{EventQueue, GameEvent, ProjectileKind};
use crate::game::world::{Obstacle, World};
use crate::util::vec2::Vec2;

/// Longest distance an entity may travel in one collision substep
const MAX_SUBSTEP_UNITS: f64 = 6.0;

/// Facing dedup threshold for `player:aimed` broadcasts
const FACE_EPS: f64 = 1e-3;

/// Positional threshold for heartbeat rebroadcasts
const HEARTBEAT_EPS: f64 = 0.01;

/// Distance a bounced projectile is nudged off the surface
const BOUNCE_NUDGE: f64 = 0.01;

#[derive(Debug, Default)]
pub struct MovementSystem {
    last_broadcast_pos: HashMap<Uuid, Vec2>,
    last_face: HashMap<Uuid, Vec2>,
    heartbeat_positions: HashMap<Uuid, Vec2>,
    heartbeat_acc_ms: f64,
    dashing: HashSet<Uuid>,
}

impl MovementSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        events: &mut EventQueue,
        now: u64,
        dt: f64,
    ) {
        self.prune_departed(world);
        self.integrate_players(world, cfg, events, now, dt);
        self.heartbeat(world, cfg, events, dt);
        self.integrate_projectiles(world, cfg, events, now, dt);
    }

    fn prune_departed(&mut self, world: &World) {
        self.last_broadcast_pos
            .retain(|id, _| world.players.contains_key(id));
        self.last_face.retain(|id, _| world.players.contains_key(id));
        self.heartbeat_positions
            .retain(|id, _| world.players.contains_key(id));
        self.dashing.retain(|id| world.players.contains_key(id));
    }

    fn integrate_players(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        events: &mut EventQueue,
        now: u64,
        dt: f64,
    ) {
        let World {
            players,
            obstacles,
            bounds,
            ..
        } = world;
        let radius = cfg.player.radius;

        for player in players.values_mut() {
            if player.is_dead {
                continue;
            }
            let id = player.id;

            // Effective velocity: base + knockback, scaled while dashing.
            let mut eff = player.vel;
            if let Some(kb) = player.knockback {
                if kb.until > now {
                    eff = eff + Vec2::new(kb.vx, kb.vy);
                } else {
                    player.knockback = None;
                }
            }
            let is_dashing = player.dashing(now);
            if is_dashing {
                eff = eff * player.dash_factor;
                self.dashing.insert(id);
            } else if self.dashing.remove(&id) {
                events.emit(GameEvent::DashEnded { player_id: id });
            }

            let start = player.pos;
            let travel = eff.length() * dt;
            if travel > 0.0 {
                let steps = (travel / MAX_SUBSTEP_UNITS).ceil().max(1.0) as u32;
                let sub_dt = dt / steps as f64;
                for _ in 0..steps {
                    player.pos = player.pos + eff * sub_dt;
                    player.pos = bounds.clamp_circle(player.pos, radius);
                    for obstacle in obstacles.iter() {
                        resolve_circle_rect(&mut player.pos, radius, obstacle);
                    }
                }
            }

            // Rotate facing toward the aim target at the turn rate.
            if !player.face_target.is_zero() {
                player.face = player
                    .face
                    .rotated_toward(player.face_target, cfg.player.turn_speed * dt)
                    .normalized_or_unit_x();
            }

            // Position broadcast, deduped.
            let moved = !player.pos.approx_eq(start, 0.0);
            let eps = cfg.combat.movement_threshold;
            let needs_pos = self
                .last_broadcast_pos
                .get(&id)
                .map_or(true, |last| !player.pos.approx_eq(*last, eps));
            if moved && needs_pos {
                self.last_broadcast_pos.insert(id, player.pos);
                events.emit(GameEvent::PlayerMove {
                    player_id: id,
                    pos: player.pos,
                });
            }

            // Facing broadcast, deduped.
            let needs_face = self
                .last_face
                .get(&id)
                .map_or(true, |last| !player.face.approx_eq(*last, FACE_EPS));
            if needs_face {
                self.last_face.insert(id, player.face);
                events.emit(GameEvent::PlayerAimed {
                    player_id: id,
                    dir: player.face,
                });
            }
        }
    }

    /// Periodic position rebroadcast for players that drifted since the last
    /// heartbeat snapshot. Mitigates a lost `player:move`.
    fn heartbeat(&mut self, world: &World, cfg: &GameConfig, events: &mut EventQueue, dt: f64) {
        self.heartbeat_acc_ms += dt * 1000.0;
        let interval = cfg.combat.heartbeat_interval_ms as f64;
        if self.heartbeat_acc_ms < interval {
            return;
        }
        self.heartbeat_acc_ms = 0.0;

        for player in world.live_players() {
            let drifted = self
                .heartbeat_positions
                .get(&player.id)
                .map_or(true, |last| !player.pos.approx_eq(*last, HEARTBEAT_EPS));
            if drifted {
                self.heartbeat_positions.insert(player.id, player.pos);
                events.emit(GameEvent::PlayerMove {
                    player_id: player.id,
                    pos: player.pos,
                });
            }
        }
    }

    fn integrate_projectiles(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        events: &mut EventQueue,
        now: u64,
        dt: f64,
    ) {
        let ids: Vec<Uuid> = world.projectiles.keys().copied().collect();

        for id in ids {
            let mut remove = false;

            {
                let World {
                    projectiles,
                    obstacles,
                    bounds,
                    ..
                } = &mut *world;
                let Some(proj) = projectiles.get_mut(&id) else {
                    continue;
                };

                if proj.expired(now) {
                    if proj.kind == ProjectileKind::Rocket {
                        events.emit(GameEvent::ExplosionSpawned {
                            pos: proj.pos,
                            radius: cfg.explosions.radius,
                            damage: cfg.explosions.damage,
                            source: Some(proj.owner),
                        });
                    }
                    remove = true;
                } else {
                    let travel = proj.vel.length() * dt;
                    let steps = (travel / MAX_SUBSTEP_UNITS).ceil().max(1.0) as u32;
                    let sub_dt = dt / steps as f64;

                    for _ in 0..steps {
                        proj.pos = proj.pos + proj.vel * sub_dt;

                        if let Some(obstacle) =
                            obstacles.iter().find(|o| o.contains(proj.pos))
                        {
                            if proj.kind == ProjectileKind::Rocket {
                                events.emit(GameEvent::ExplosionSpawned {
                                    pos: proj.pos,
                                    radius: cfg.explosions.radius,
                                    damage: cfg.explosions.damage,
                                    source: Some(proj.owner),
                                });
                                remove = true;
                                break;
                            }

                            let normal = penetration_normal(obstacle, proj.pos);
                            nudge_outside(&mut proj.pos, obstacle, normal);
                            if proj.bounce(normal) {
                                events.emit(GameEvent::ProjectileBounced { id, normal });
                            } else {
                                remove = true;
                                break;
                            }
                        }

                        if !bounds.contains(proj.pos) {
                            remove = true;
                            break;
                        }
                    }

                    if !remove {
                        events.emit(GameEvent::ProjectileMoved { id, pos: proj.pos });
                    }
                }
            }

            if remove {
                world.projectiles.remove(&id);
                events.emit(GameEvent::ProjectileDespawned { id });
            }
        }
    }
}

/// Push a circle out of a rect along the shortest penetration vector.
fn resolve_circle_rect(pos: &mut Vec2, radius: f64, rect: &Obstacle) {
    let closest = rect.closest_point(*pos);
    let delta = *pos - closest;
    let dist = delta.length();

    if dist > 1e-9 {
        if dist < radius {
            *pos = closest + delta.normalized() * radius;
        }
        return;
    }

    // Center is inside the rect: exit through the nearest side.
    let left = pos.x - rect.x;
    let right = rect.x + rect.w - pos.x;
    let top = pos.y - rect.y;
    let bottom = rect.y + rect.h - pos.y;
    let min = left.min(right).min(top).min(bottom);

    if min == left {
        pos.x = rect.x - radius;
    } else if min == right {
        pos.x = rect.x + rect.w + radius;
    } else if min == top {
        pos.y = rect.y - radius;
    } else {
        pos.y = rect.y + rect.h + radius;
    }
}

/// Outward normal of the rect side nearest to an interior point.
fn penetration_normal(rect: &Obstacle, pos: Vec2) -> Vec2 {
    let left = pos.x - rect.x;
    let right = rect.x + rect.w - pos.x;
    let top = pos.y - rect.y;
    let bottom = rect.y + rect.h - pos.y;
    let min = left.min(right).min(top).min(bottom);

    if min == left {
        Vec2::new(-1.0, 0.0)
    } else if min == right {
        Vec2::new(1.0, 0.0)
    } else if min == top {
        Vec2::new(0.0, -1.0)
    } else {
        Vec2::new(0.0, 1.0)
    }
}

/// Place the point just outside the rect along the given side normal.
fn nudge_outside(pos: &mut Vec2, rect: &Obstacle, normal: Vec2) {
    if normal.x < 0.0 {
        pos.x = rect.x - BOUNCE_NUDGE;
    } else if normal.x > 0.0 {
        pos.x = rect.x + rect.w + BOUNCE_NUDGE;
    } else if normal.y < 0.0 {
        pos.y = rect.y - BOUNCE_NUDGE;
    } else {
        pos.y = rect.y + rect.h + BOUNCE_NUDGE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{Knockback, Player, Projectile};

    fn cfg() -> GameConfig {
        GameConfig::default()
    }

    fn empty_world(cfg: &GameConfig) -> World {
        let mut world = World::new(cfg);
        world.obstacles.clear();
        world
    }

    fn add_player(world: &mut World, cfg: &GameConfig, pos: Vec2) -> Uuid {
        let id = Uuid::new_v4();
        world
            .players
            .insert(id, Player::new(id, "p".into(), pos, cfg, 0));
        id
    }

    fn events_of_kind<'a>(events: &'a [GameEvent], kind: &str) -> Vec<&'a GameEvent> {
        events.iter().filter(|e| e.kind() == kind).collect()
    }

    #[test]
    fn stationary_player_emits_nothing_after_first_tick() {
        let c = cfg();
        let mut world = empty_world(&c);
        add_player(&mut world, &c, Vec2::new(400.0, 400.0));
        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();

        // First tick broadcasts the initial facing.
        sys.tick(&mut world, &c, &mut events, 0, 1.0 / 30.0);
        events.drain();

        sys.tick(&mut world, &c, &mut events, 33, 1.0 / 30.0);
        assert!(events.drain().is_empty());
    }

    #[test]
    fn moving_player_broadcasts_position() {
        let c = cfg();
        let mut world = empty_world(&c);
        let id = add_player(&mut world, &c, Vec2::new(400.0, 400.0));
        world.players.get_mut(&id).unwrap().vel = Vec2::new(c.player.speed, 0.0);

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        sys.tick(&mut world, &c, &mut events, 0, 1.0 / 30.0);

        let drained = events.drain();
        let moves = events_of_kind(&drained, "player:move");
        assert_eq!(moves.len(), 1);
        let p = world.players.get(&id).unwrap();
        assert!((p.pos.x - (400.0 + c.player.speed / 30.0)).abs() < 1e-6);
    }

    #[test]
    fn dead_player_position_is_frozen() {
        let c = cfg();
        let mut world = empty_world(&c);
        let id = add_player(&mut world, &c, Vec2::new(400.0, 400.0));
        {
            let p = world.players.get_mut(&id).unwrap();
            p.vel = Vec2::new(200.0, 0.0);
            p.is_dead = true;
        }

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        sys.tick(&mut world, &c, &mut events, 0, 1.0 / 30.0);

        assert_eq!(world.players.get(&id).unwrap().pos, Vec2::new(400.0, 400.0));
        assert!(events.drain().is_empty());
    }

    #[test]
    fn knockback_adds_velocity_then_clears() {
        let c = cfg();
        let mut world = empty_world(&c);
        let id = add_player(&mut world, &c, Vec2::new(400.0, 400.0));
        world.players.get_mut(&id).unwrap().knockback = Some(Knockback {
            vx: 90.0,
            vy: 0.0,
            until: 100,
        });

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        sys.tick(&mut world, &c, &mut events, 0, 1.0 / 30.0);
        let after_kb = world.players.get(&id).unwrap().pos.x;
        assert!(after_kb > 400.0);

        // Expired knockback clears and stops influencing movement.
        sys.tick(&mut world, &c, &mut events, 200, 1.0 / 30.0);
        let p = world.players.get(&id).unwrap();
        assert!(p.knockback.is_none());
        assert!((p.pos.x - after_kb).abs() < 1e-9);
    }

    #[test]
    fn dash_scales_displacement_and_emits_end() {
        let c = cfg();
        let mut world = empty_world(&c);
        let id = add_player(&mut world, &c, Vec2::new(400.0, 400.0));
        {
            let p = world.players.get_mut(&id).unwrap();
            p.vel = Vec2::new(100.0, 0.0);
            p.dash_until = 50;
            p.dash_factor = 2.5;
        }

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        let dt = 1.0 / 30.0;
        sys.tick(&mut world, &c, &mut events, 0, dt);
        let p = world.players.get(&id).unwrap();
        assert!((p.pos.x - (400.0 + 250.0 * dt)).abs() < 1e-6);
        events.drain();

        sys.tick(&mut world, &c, &mut events, 100, dt);
        let drained = events.drain();
        assert_eq!(events_of_kind(&drained, "dash:ended").len(), 1);
    }

    #[test]
    fn player_cannot_escape_bounds_corner() {
        let c = cfg();
        let mut world = empty_world(&c);
        let id = add_player(&mut world, &c, Vec2::new(30.0, 30.0));
        world.players.get_mut(&id).unwrap().vel = Vec2::new(-4000.0, -4000.0);

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        sys.tick(&mut world, &c, &mut events, 0, 0.1);

        let p = world.players.get(&id).unwrap();
        assert_eq!(p.pos, Vec2::new(c.player.radius, c.player.radius));
    }

    #[test]
    fn player_is_pushed_out_of_obstacle() {
        let c = cfg();
        let mut world = empty_world(&c);
        world.obstacles.push(Obstacle::rect(500.0, 300.0, 100.0, 400.0));
        let id = add_player(&mut world, &c, Vec2::new(470.0, 500.0));
        world.players.get_mut(&id).unwrap().vel = Vec2::new(300.0, 0.0);

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        for tick in 0..10 {
            sys.tick(&mut world, &c, &mut events, tick * 33, 1.0 / 30.0);
        }

        let p = world.players.get(&id).unwrap();
        // Blocked at the left face of the wall.
        assert!(p.pos.x <= 500.0 - c.player.radius + 1e-6);
    }

    #[test]
    fn aim_rotates_at_turn_rate() {
        let c = cfg();
        let mut world = empty_world(&c);
        let id = add_player(&mut world, &c, Vec2::new(400.0, 400.0));
        world.players.get_mut(&id).unwrap().face_target = Vec2::new(0.0, 1.0);

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        let dt = 1.0 / 30.0;
        sys.tick(&mut world, &c, &mut events, 0, dt);

        let p = world.players.get(&id).unwrap();
        let expected = c.player.turn_speed * dt;
        assert!((p.face.angle() - expected).abs() < 1e-6);

        let drained = events.drain();
        assert_eq!(events_of_kind(&drained, "player:aimed").len(), 1);
    }

    #[test]
    fn heartbeat_rebroadcasts_drifted_players() {
        let c = cfg();
        let mut world = empty_world(&c);
        let id = add_player(&mut world, &c, Vec2::new(400.0, 400.0));

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        let dt = 1.0 / 30.0;

        // The player never moves during integration (zero velocity), so the
        // regular broadcast path stays silent; an external nudge each tick
        // still drifts the position past the heartbeat threshold.
        let ticks = (c.combat.heartbeat_interval_ms as f64 / (dt * 1000.0)).ceil() as u64 + 1;
        let mut moves = 0;
        for tick in 0..ticks {
            world.players.get_mut(&id).unwrap().pos.x += 0.02;
            sys.tick(&mut world, &c, &mut events, tick * 33, dt);
            let drained = events.drain();
            moves += events_of_kind(&drained, "player:move").len();
        }
        assert!(moves >= 1, "heartbeat should rebroadcast drifted players");
    }

    #[test]
    fn fast_projectile_does_not_tunnel_through_wall() {
        let c = cfg();
        let mut world = empty_world(&c);
        // 80-unit-thick wall ahead of the projectile.
        world.obstacles.push(Obstacle::rect(600.0, 0.0, 80.0, 1200.0));

        let proj = Projectile::new(
            Uuid::new_v4(),
            ProjectileKind::Bullet,
            Vec2::new(500.0, 600.0),
            Vec2::new(1.0, 0.0),
            &c.projectiles,
            0,
        );
        let mut fast = proj;
        fast.vel = Vec2::new(1000.0, 0.0);
        let id = fast.id;
        world.projectiles.insert(id, fast);

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        sys.tick(&mut world, &c, &mut events, 1, 0.1);

        let drained = events.drain();
        assert_eq!(events_of_kind(&drained, "projectile:bounced").len(), 1);
        let p = world.projectiles.get(&id).unwrap();
        // Reflected back out the left face, never past the wall.
        assert!(p.pos.x < 600.0);
        assert!(p.vel.x < 0.0);
    }

    #[test]
    fn bullet_despawns_when_bounces_exhausted() {
        let c = cfg();
        let mut world = empty_world(&c);
        world.obstacles.push(Obstacle::rect(600.0, 0.0, 80.0, 1200.0));

        let mut proj = Projectile::new(
            Uuid::new_v4(),
            ProjectileKind::Bullet,
            Vec2::new(590.0, 600.0),
            Vec2::new(1.0, 0.0),
            &c.projectiles,
            0,
        );
        proj.bounce_count = proj.max_bounces; // next bounce fails
        let id = proj.id;
        world.projectiles.insert(id, proj);

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        sys.tick(&mut world, &c, &mut events, 1, 1.0 / 30.0);

        let drained = events.drain();
        assert!(world.projectiles.is_empty());
        assert_eq!(events_of_kind(&drained, "projectile:despawned").len(), 1);
        assert!(events_of_kind(&drained, "projectile:bounced").is_empty());
    }

    #[test]
    fn rocket_explodes_on_wall_hit() {
        let c = cfg();
        let mut world = empty_world(&c);
        world.obstacles.push(Obstacle::rect(600.0, 0.0, 80.0, 1200.0));

        let proj = Projectile::new(
            Uuid::new_v4(),
            ProjectileKind::Rocket,
            Vec2::new(595.0, 600.0),
            Vec2::new(1.0, 0.0),
            &c.projectiles,
            0,
        );
        let id = proj.id;
        world.projectiles.insert(id, proj);

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        sys.tick(&mut world, &c, &mut events, 1, 1.0 / 30.0);

        let drained = events.drain();
        assert!(world.projectiles.is_empty());
        assert_eq!(events_of_kind(&drained, "explosion:spawned").len(), 1);
        assert_eq!(events_of_kind(&drained, "projectile:despawned").len(), 1);
    }

    #[test]
    fn expired_projectile_despawns() {
        let c = cfg();
        let mut world = empty_world(&c);
        let proj = Projectile::new(
            Uuid::new_v4(),
            ProjectileKind::Bullet,
            Vec2::new(400.0, 400.0),
            Vec2::new(1.0, 0.0),
            &c.projectiles,
            0,
        );
        let lifetime = proj.lifetime_ms;
        world.projectiles.insert(proj.id, proj);

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        sys.tick(&mut world, &c, &mut events, lifetime + 1, 1.0 / 30.0);

        let drained = events.drain();
        assert!(world.projectiles.is_empty());
        assert_eq!(events_of_kind(&drained, "projectile:despawned").len(), 1);
        // A plain bullet expiring does not explode.
        assert!(events_of_kind(&drained, "explosion:spawned").is_empty());
    }

    #[test]
    fn rocket_explodes_on_expiry() {
        let c = cfg();
        let mut world = empty_world(&c);
        let proj = Projectile::new(
            Uuid::new_v4(),
            ProjectileKind::Rocket,
            Vec2::new(400.0, 400.0),
            Vec2::new(1.0, 0.0),
            &c.projectiles,
            0,
        );
        let lifetime = proj.lifetime_ms;
        world.projectiles.insert(proj.id, proj);

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        sys.tick(&mut world, &c, &mut events, lifetime, 1.0 / 30.0);

        let drained = events.drain();
        assert_eq!(events_of_kind(&drained, "explosion:spawned").len(), 1);
        assert!(world.projectiles.is_empty());
    }

    #[test]
    fn projectile_leaving_world_despawns() {
        let c = cfg();
        let mut world = empty_world(&c);
        let mut proj = Projectile::new(
            Uuid::new_v4(),
            ProjectileKind::Bullet,
            Vec2::new(1995.0, 600.0),
            Vec2::new(1.0, 0.0),
            &c.projectiles,
            0,
        );
        proj.vel = Vec2::new(520.0, 0.0);
        world.projectiles.insert(proj.id, proj);

        let mut sys = MovementSystem::new();
        let mut events = EventQueue::new();
        sys.tick(&mut world, &c, &mut events, 1, 1.0 / 30.0);

        assert!(world.projectiles.is_empty());
    }
}
