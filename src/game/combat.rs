//! Combat resolution: projectile hits, damage, explosions, kills, assists,
//! and streaks.
//!
//! Hit scanning runs on the post phase of every tick; damage and explosion
//! events emitted there (or by movement) are resolved by the handlers below
//! when the engine dispatches them.

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::entities::Knockback;
use crate::game::events::{EventQueue, FeedItem, GameEvent, ProjectileKind, Weapon};
use crate::game::world::World;
use crate::util::vec2::Vec2;

/// One contribution toward a potential assist
#[derive(Debug, Clone)]
struct DamageRecord {
    source: Uuid,
    timestamp: u64,
}

#[derive(Debug, Default)]
pub struct CombatSystem {
    /// Damage taken per victim inside the assist window
    recent_damage: HashMap<Uuid, Vec<DamageRecord>>,
    /// Respawn lockout expiry per dead player
    dead_until: HashMap<Uuid, u64>,
}

impl CombatSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan projectiles against live non-owner players. A hit consumes the
    /// projectile: rockets convert to an explosion, bullets and pellets to
    /// direct damage.
    pub fn tick(&mut self, world: &mut World, cfg: &GameConfig, events: &mut EventQueue) {
        let proj_ids: Vec<Uuid> = world.projectiles.keys().copied().collect();

        for pid in proj_ids {
            let Some(proj) = world.projectiles.get(&pid) else {
                continue;
            };
            let owner = proj.owner;
            let pos = proj.pos;
            let hit_radius = proj.hit_radius;
            let kind = proj.kind;
            let damage = proj.current_damage();

            let target = world
                .players
                .values()
                .find(|p| p.is_alive() && p.id != owner && p.pos.distance_to(pos) <= hit_radius)
                .map(|p| p.id);

            let Some(target_id) = target else {
                continue;
            };

            world.projectiles.remove(&pid);
            events.emit(GameEvent::ProjectileDespawned { id: pid });

            match kind {
                ProjectileKind::Rocket => {
                    events.emit(GameEvent::ExplosionSpawned {
                        pos,
                        radius: cfg.explosions.radius,
                        damage: cfg.explosions.damage,
                        source: Some(owner),
                    });
                }
                ProjectileKind::Bullet | ProjectileKind::Pellet => {
                    events.emit(GameEvent::DamageApplied {
                        target_id,
                        amount: damage,
                        source: Some(owner),
                        weapon: kind.into(),
                    });
                }
            }

            if let Some(shooter) = world.players.get_mut(&owner) {
                shooter.stats.shots_hit += 1;
            }
        }
    }

    /// Resolve a `damage:applied` event against the target.
    pub fn handle_damage(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        events: &mut EventQueue,
        now: u64,
        target_id: Uuid,
        amount: f64,
        source: Option<Uuid>,
        weapon: Weapon,
    ) {
        let died;
        let effective;
        {
            let Some(target) = world.players.get_mut(&target_id) else {
                return;
            };
            if target.is_dead || target.invulnerable(now) {
                return;
            }

            effective = if target.shielded(now) {
                (amount * cfg.buffs.shield_reduction).ceil()
            } else {
                amount
            };

            target.hp = (target.hp - effective).max(0.0);
            target.stats.damage_taken += effective;
            died = target.hp <= 0.0;
        }

        let attacker = source.filter(|s| *s != target_id);
        if let Some(src) = attacker {
            let window = cfg.combat.assist_time_window_ms;
            let records = self.recent_damage.entry(target_id).or_default();
            records.retain(|r| now.saturating_sub(r.timestamp) <= window);
            records.push(DamageRecord {
                source: src,
                timestamp: now,
            });

            if let Some(shooter) = world.players.get_mut(&src) {
                shooter.stats.damage_dealt += effective;
            }

            // Explosions carry their own radial knockback; only direct hits
            // shove the target away from the attacker here.
            if weapon != Weapon::Explosion {
                let src_pos = world.players.get(&src).map(|p| p.pos);
                if let Some(src_pos) = src_pos {
                    if let Some(target) = world.players.get_mut(&target_id) {
                        let dir = (target.pos - src_pos).normalized_or_unit_x();
                        let v = dir * (amount * cfg.explosions.knockback_power);
                        let duration = cfg.combat.knockback_duration_ms;
                        target.knockback = Some(Knockback {
                            vx: v.x,
                            vy: v.y,
                            until: now + duration,
                        });
                        events.emit(GameEvent::KnockbackApplied {
                            player_id: target_id,
                            vx: v.x,
                            vy: v.y,
                            duration,
                        });
                    }
                }
            }
        }

        if died {
            self.resolve_kill(world, cfg, events, now, target_id, attacker, weapon);
        }
    }

    /// Apply explosion splash: damage plus radial knockback for every live
    /// player inside the blast radius, the owner included.
    pub fn handle_explosion(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        events: &mut EventQueue,
        now: u64,
        pos: Vec2,
        radius: f64,
        damage: f64,
        source: Option<Uuid>,
    ) {
        let victims: Vec<(Uuid, Vec2)> = world
            .players
            .values()
            .filter(|p| p.is_alive() && p.pos.distance_to(pos) <= radius)
            .map(|p| (p.id, p.pos))
            .collect();

        for (victim_id, victim_pos) in victims {
            events.emit(GameEvent::DamageApplied {
                target_id: victim_id,
                amount: damage,
                source,
                weapon: Weapon::Explosion,
            });

            let dir = (victim_pos - pos).normalized_or_unit_x();
            let v = dir * (damage * cfg.explosions.knockback_power);
            let duration = cfg.combat.knockback_duration_ms;
            if let Some(player) = world.players.get_mut(&victim_id) {
                player.knockback = Some(Knockback {
                    vx: v.x,
                    vy: v.y,
                    until: now + duration,
                });
            }
            events.emit(GameEvent::KnockbackApplied {
                player_id: victim_id,
                vx: v.x,
                vy: v.y,
                duration,
            });
        }
    }

    fn resolve_kill(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        events: &mut EventQueue,
        now: u64,
        victim_id: Uuid,
        killer: Option<Uuid>,
        weapon: Weapon,
    ) {
        if let Some(victim) = world.players.get_mut(&victim_id) {
            victim.is_dead = true;
            victim.died_at = Some(now);
            victim.vel = Vec2::ZERO;
            victim.stats.deaths += 1;
            victim.stats.current_streak = 0;
            victim.stats.last_death_time = Some(now);
        }

        let killer = killer.filter(|k| world.players.contains_key(k));
        if let Some(killer_id) = killer {
            // Unique contributors inside the window, killer excluded.
            let window = cfg.combat.assist_time_window_ms;
            let mut assist_ids: Vec<Uuid> = Vec::new();
            if let Some(records) = self.recent_damage.get(&victim_id) {
                for r in records {
                    if r.source != killer_id
                        && now.saturating_sub(r.timestamp) <= window
                        && !assist_ids.contains(&r.source)
                    {
                        assist_ids.push(r.source);
                    }
                }
            }

            if let Some(killer_p) = world.players.get_mut(&killer_id) {
                let previous = killer_p.stats.current_streak;
                killer_p.stats.kills += 1;
                killer_p.stats.current_streak += 1;
                killer_p.stats.best_streak =
                    killer_p.stats.best_streak.max(killer_p.stats.current_streak);
                killer_p.stats.last_kill_time = Some(now);
                events.emit(GameEvent::StreakChanged {
                    player_id: killer_id,
                    streak: previous + 1,
                    previous_streak: previous,
                });
            }

            for assist_id in &assist_ids {
                if let Some(assister) = world.players.get_mut(assist_id) {
                    assister.stats.assists += 1;
                }
            }

            events.emit(GameEvent::PlayerKill {
                killer_id,
                victim_id,
                assist_ids: assist_ids.clone(),
            });
            events.emit(GameEvent::FeedEntry(FeedItem {
                killer: killer_id,
                victim: victim_id,
                weapon,
                assist_ids: assist_ids.clone(),
                timestamp: now,
            }));

            for id in std::iter::once(killer_id)
                .chain(assist_ids.iter().copied())
                .chain(std::iter::once(victim_id))
            {
                if let Some(p) = world.players.get(&id) {
                    events.emit(GameEvent::ScoreUpdate {
                        player_id: id,
                        kills: p.stats.kills,
                        deaths: p.stats.deaths,
                        assists: p.stats.assists,
                    });
                }
            }
        }

        events.emit(GameEvent::PlayerDie {
            player_id: victim_id,
        });
        self.recent_damage.remove(&victim_id);
    }

    /// Start the respawn lockout for a freshly dead player. Returns the
    /// timestamp the player may respawn at.
    pub fn on_player_die(&mut self, id: Uuid, now: u64, cfg: &GameConfig) -> u64 {
        let until = now + cfg.combat.respawn_delay_ms;
        self.dead_until.insert(id, until);
        until
    }

    pub fn dead_until(&self) -> &HashMap<Uuid, u64> {
        &self.dead_until
    }

    /// Drop per-player bookkeeping when a player leaves the world.
    pub fn remove_player(&mut self, id: Uuid) {
        self.recent_damage.remove(&id);
        self.dead_until.remove(&id);
    }
}
