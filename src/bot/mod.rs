//! Server-driven bots.
//!
//! Bots issue the same commands as clients, on a think interval: chase the
//! nearest live target, keep separation from nearby bodies, aim ahead of
//! the movement, and fire when the target sits inside the fire arc. The
//! engine feeds the returned commands through the regular command path.

use std::collections::HashMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::events::Skill;
use crate::game::world::World;
use crate::util::vec2::Vec2;

/// Milliseconds between decisions, plus per-bot jitter
const THINK_INTERVAL_MS: u64 = 150;
const THINK_JITTER_MS: u64 = 60;

/// Shoot only when the facing is within this many radians of the target
const FIRE_ARC_RAD: f64 = 0.35;
const FIRE_RANGE: f64 = 700.0;
const SHOTGUN_RANGE: f64 = 170.0;
const ROCKET_MIN_RANGE: f64 = 350.0;

/// Crowding distance that triggers separation steering
const SEPARATION_RADIUS: f64 = 80.0;

/// Stop closing distance below this and orbit instead
const PREFERRED_RANGE: f64 = 220.0;

/// A decision a bot made this think; applied via the command system
#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    Move(Vec2),
    Aim(Vec2),
    Cast(Skill),
    Respawn,
}

#[derive(Debug)]
struct BotBrain {
    next_think: u64,
    wander: Vec2,
}

#[derive(Debug)]
pub struct BotRoster {
    brains: HashMap<Uuid, BotBrain>,
}

impl BotRoster {
    pub fn new() -> Self {
        Self {
            brains: HashMap::new(),
        }
    }

    pub fn add(&mut self, id: Uuid) {
        self.brains.insert(
            id,
            BotBrain {
                next_think: 0,
                wander: Vec2::new(1.0, 0.0),
            },
        );
    }

    pub fn remove(&mut self, id: Uuid) {
        self.brains.remove(&id);
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.brains.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.brains.len()
    }

    /// Run every bot whose think timer elapsed; returns the commands to
    /// apply, in bot order.
    pub fn think(
        &mut self,
        world: &World,
        cfg: &GameConfig,
        dead_until: &HashMap<Uuid, u64>,
        rng: &mut ChaCha8Rng,
        now: u64,
    ) -> Vec<(Uuid, BotCommand)> {
        let mut commands = Vec::new();

        let mut ids: Vec<Uuid> = self.brains.keys().copied().collect();
        ids.sort();

        for id in ids {
            let Some(brain) = self.brains.get_mut(&id) else {
                continue;
            };
            if now < brain.next_think {
                continue;
            }
            brain.next_think = now + THINK_INTERVAL_MS + rng.gen_range(0..=THINK_JITTER_MS);

            let Some(me) = world.players.get(&id) else {
                continue;
            };

            if me.is_dead {
                let ready = dead_until.get(&id).map_or(true, |&until| now >= until);
                if ready {
                    commands.push((id, BotCommand::Respawn));
                }
                continue;
            }

            let target = world
                .players
                .values()
                .filter(|p| p.id != id && p.is_alive())
                .min_by(|a, b| {
                    a.pos
                        .distance_to(me.pos)
                        .total_cmp(&b.pos.distance_to(me.pos))
                });

            let Some(target) = target else {
                // Alone in the arena: wander, occasionally turning.
                if rng.gen_bool(0.2) {
                    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
                    brain.wander = Vec2::new(angle.cos(), angle.sin());
                }
                commands.push((id, BotCommand::Move(brain.wander)));
                continue;
            };

            let to_target = target.pos - me.pos;
            let dist = to_target.length();
            let aim = to_target.normalized_or_unit_x();

            // Chase until close, then orbit; always keep clear of crowds.
            let mut steer = if dist > PREFERRED_RANGE {
                aim
            } else {
                Vec2::new(-aim.y, aim.x)
            };
            for other in world.players.values() {
                if other.id == id || other.is_dead {
                    continue;
                }
                let gap = me.pos - other.pos;
                let d = gap.length();
                if d > 0.0 && d < SEPARATION_RADIUS {
                    steer = steer + gap.normalized() * (1.0 - d / SEPARATION_RADIUS);
                }
            }

            commands.push((id, BotCommand::Move(steer.normalized_or_unit_x())));
            commands.push((id, BotCommand::Aim(aim)));

            // Fire when the current facing lines up with the target.
            let facing_error = me.face.cross(aim).atan2(me.face.dot(aim)).abs();
            if facing_error <= FIRE_ARC_RAD && dist <= FIRE_RANGE {
                let skill = if dist <= SHOTGUN_RANGE {
                    Skill::Shotgun
                } else if dist >= ROCKET_MIN_RANGE && rng.gen_bool(0.2) {
                    Skill::Rocket
                } else {
                    Skill::Shoot
                };
                if me.cooldown_free(skill, now) {
                    commands.push((id, BotCommand::Cast(skill)));
                }
            } else if dist < SEPARATION_RADIUS && rng.gen_bool(0.1) {
                // Point blank and facing the wrong way: dash out.
                if me.cooldown_free(Skill::Dash, now) {
                    commands.push((id, BotCommand::Cast(Skill::Dash)));
                }
            }
        }

        commands
    }
}

impl Default for BotRoster {
    fn default() -> Self {
        Self::new()
    }
}
