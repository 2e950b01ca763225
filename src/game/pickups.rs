//! Pickup spawning, collection, and buff lifecycle.
//!
//! Runs on the post phase: a periodic spawn keeps the field stocked up to a
//! cap, live players collect anything inside the pick radius, and expired
//! haste/shield buffs are cleared with a `buff:expired` event.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::entities::Pickup;
use crate::game::events::{EventQueue, GameEvent, PickupKind};
use crate::game::spawn::SpawnManager;
use crate::game::world::World;

#[derive(Debug, Default)]
pub struct PickupSystem {
    spawn_acc_ms: f64,
}

impl PickupSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        spawn: &SpawnManager,
        rng: &mut ChaCha8Rng,
        events: &mut EventQueue,
        now: u64,
        dt: f64,
    ) {
        self.spawn_pickups(world, cfg, spawn, rng, events, dt);
        self.collect_pickups(world, cfg, events, now);
        self.expire_buffs(world, events, now);
    }

    fn spawn_pickups(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        spawn: &SpawnManager,
        rng: &mut ChaCha8Rng,
        events: &mut EventQueue,
        dt: f64,
    ) {
        self.spawn_acc_ms += dt * 1000.0;
        if self.spawn_acc_ms < cfg.pickups.spawn_interval_ms as f64 {
            return;
        }
        self.spawn_acc_ms = 0.0;

        if world.pickups.len() >= cfg.pickups.max_alive {
            return;
        }

        let pos = spawn.find_safe_spawn_position(world, rng);
        let kind = match rng.gen_range(0..3) {
            0 => PickupKind::Heal,
            1 => PickupKind::Haste,
            _ => PickupKind::Shield,
        };
        let pickup = Pickup {
            id: Uuid::new_v4(),
            pos,
            kind,
        };
        events.emit(GameEvent::PickupSpawned {
            id: pickup.id,
            pos,
            kind,
        });
        world.pickups.insert(pickup.id, pickup);
    }

    fn collect_pickups(
        &mut self,
        world: &mut World,
        cfg: &GameConfig,
        events: &mut EventQueue,
        now: u64,
    ) {
        let player_ids: Vec<Uuid> = world
            .players
            .values()
            .filter(|p| p.is_alive())
            .map(|p| p.id)
            .collect();

        for player_id in player_ids {
            let Some(pos) = world.players.get(&player_id).map(|p| p.pos) else {
                continue;
            };
            let collected: Vec<Uuid> = world
                .pickups
                .values()
                .filter(|pk| pk.pos.distance_to(pos) <= cfg.pickups.pick_radius)
                .map(|pk| pk.id)
                .collect();

            for pickup_id in collected {
                let Some(pickup) = world.pickups.remove(&pickup_id) else {
                    continue;
                };
                events.emit(GameEvent::PickupCollected {
                    id: pickup_id,
                    by: player_id,
                });

                let Some(player) = world.players.get_mut(&player_id) else {
                    continue;
                };
                match pickup.kind {
                    PickupKind::Heal => {
                        player.hp = (player.hp + cfg.buffs.heal_amount).min(cfg.player.hp);
                        events.emit(GameEvent::BuffApplied {
                            player_id,
                            kind: PickupKind::Heal,
                            duration: 0,
                        });
                    }
                    PickupKind::Haste => {
                        player.haste_until = now + cfg.buffs.haste_default_duration_ms;
                        player.haste_factor = cfg.buffs.haste_multiplier;
                        events.emit(GameEvent::BuffApplied {
                            player_id,
                            kind: PickupKind::Haste,
                            duration: cfg.buffs.haste_default_duration_ms,
                        });
                    }
                    PickupKind::Shield => {
                        player.shield_until = now + cfg.buffs.shield_default_duration_ms;
                        events.emit(GameEvent::BuffApplied {
                            player_id,
                            kind: PickupKind::Shield,
                            duration: cfg.buffs.shield_default_duration_ms,
                        });
                    }
                }
            }
        }
    }

    fn expire_buffs(&mut self, world: &mut World, events: &mut EventQueue, now: u64) {
        for player in world.players.values_mut() {
            if player.haste_until != 0 && player.haste_until <= now {
                player.haste_until = 0;
                player.haste_factor = 1.0;
                events.emit(GameEvent::BuffExpired {
                    player_id: player.id,
                    kind: PickupKind::Haste,
                });
            }
            if player.shield_until != 0 && player.shield_until <= now {
                player.shield_until = 0;
                events.emit(GameEvent::BuffExpired {
                    player_id: player.id,
                    kind: PickupKind::Shield,
                });
            }
        }
    }
}
