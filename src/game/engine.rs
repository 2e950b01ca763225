//! The authoritative engine: one task owning the world and every system.
//!
//! Client frames arrive over a command channel, the tick loop runs at a
//! fixed 30 Hz, and every state change flows through the event queue. The
//! dispatch loop hands each event, in emission order, to the combat
//! handlers, the journal, the HUD projection, and the broadcast fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use crate::bot::{BotCommand, BotRoster};
use crate::config::Config;
use crate::game::combat::CombatSystem;
use crate::game::commands::CommandSystem;
use crate::game::events::{EventQueue, GameEvent};
use crate::game::movement::MovementSystem;
use crate::game::pickups::PickupSystem;
use crate::game::r#match::MatchController;
use crate::game::spawn::SpawnManager;
use crate::game::tasks::{Task, TaskQueue};
use crate::game::world::World;
use crate::hud::{HudDispatcher, SimView};
use crate::journal::{JournalSystem, SaveJob};
use crate::util::time::{unix_millis, MAX_TICK_DELTA_SECS, TICK_DURATION_MICROS};
use crate::ws::protocol::{ClientMsg, PlayerSummary, ServerMsg, WidgetKey};
use crate::ws::registry::ConnectionRegistry;

/// Inbound command channel capacity
pub const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// Messages handed to the engine task
#[derive(Debug)]
pub enum EngineCommand {
    /// A connection opened; send it the welcome frames
    Connect { conn_id: Uuid },
    /// A decoded client frame
    Frame { conn_id: Uuid, msg: ClientMsg },
    /// The connection closed
    Disconnect { conn_id: Uuid },
    /// Stop the loop after a final journal save
    Shutdown { ack: oneshot::Sender<()> },
}

/// Counters exported for the health endpoint
#[derive(Debug, Default)]
pub struct EngineStats {
    pub players: AtomicUsize,
    pub live_players: AtomicUsize,
    pub projectiles: AtomicUsize,
    pub pickups: AtomicUsize,
}

pub struct Engine {
    cfg: Arc<Config>,
    world: World,
    rng: ChaCha8Rng,
    spawn: SpawnManager,
    commands: CommandSystem,
    movement: MovementSystem,
    combat: CombatSystem,
    pickups: PickupSystem,
    match_ctl: MatchController,
    hud: HudDispatcher,
    bots: BotRoster,
    tasks: TaskQueue,
    journal: JournalSystem,
    events: EventQueue,
    registry: Arc<ConnectionRegistry>,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    stats: Arc<EngineStats>,
}

impl Engine {
    pub fn new(
        cfg: Arc<Config>,
        registry: Arc<ConnectionRegistry>,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        journal_tx: Option<mpsc::Sender<SaveJob>>,
        stats: Arc<EngineStats>,
        now: u64,
    ) -> Self {
        let world = World::new(&cfg.game);
        let journal = JournalSystem::new(cfg.journal.clone(), journal_tx, now);
        Self {
            world,
            rng: ChaCha8Rng::seed_from_u64(rand::random()),
            spawn: SpawnManager::default(),
            commands: CommandSystem::new(),
            movement: MovementSystem::new(),
            combat: CombatSystem::new(),
            pickups: PickupSystem::new(),
            match_ctl: MatchController::new(cfg.game.arena_match.clone()),
            hud: HudDispatcher::new(),
            bots: BotRoster::new(),
            tasks: TaskQueue::new(),
            journal,
            events: EventQueue::new(),
            registry,
            cmd_rx,
            stats,
            cfg,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access for headless drivers and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn journal(&self) -> &JournalSystem {
        &self.journal
    }

    /// Create the demo match, schedule the journal auto-save, and seed the
    /// bot roster. Called once before the tick loop.
    pub fn bootstrap(&mut self, now: u64) {
        self.match_ctl
            .create_match(&self.world, &mut self.events, &mut self.tasks, now);
        self.tasks.schedule(
            now + self.cfg.journal.autosave_interval_ms,
            Task::JournalAutosave,
        );

        for i in 0..self.cfg.bot_count {
            let id = Uuid::new_v4();
            self.commands.join(
                &mut self.world,
                &self.spawn,
                &mut self.rng,
                &self.cfg.game,
                &mut self.events,
                now,
                id,
                format!("Bot {}", i + 1),
            );
            if let Some(player) = self.world.players.get_mut(&id) {
                player.is_bot = true;
            }
            self.bots.add(id);
        }

        self.dispatch(now);
        info!(bots = self.cfg.bot_count, "engine bootstrapped");
    }

    /// Run the fixed-rate tick loop until shutdown.
    pub async fn run(mut self) {
        let now = unix_millis();
        self.bootstrap(now);

        let tick_duration = Duration::from_micros(TICK_DURATION_MICROS);
        let mut interval = tokio::time::interval(tick_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut prev = Instant::now();

        loop {
            interval.tick().await;

            let now = unix_millis();
            // Clamped delta: a long stall resumes with one bounded tick, no
            // catch-up.
            let dt = prev.elapsed().as_secs_f64().min(MAX_TICK_DELTA_SECS);
            prev = Instant::now();

            if self.drain_commands(now) {
                break;
            }
            self.step(now, dt);
        }

        info!("engine stopped");
    }

    /// Drain inbound commands. Returns true when the engine should stop.
    fn drain_commands(&mut self, now: u64) -> bool {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(EngineCommand::Shutdown { ack }) => {
                    info!("engine shutting down, saving journal");
                    self.journal.shutdown();
                    let _ = ack.send(());
                    return true;
                }
                Ok(cmd) => self.handle_command(cmd, now),
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.journal.shutdown();
                    return true;
                }
            }
        }
    }

    /// One full simulation tick.
    pub fn step(&mut self, now: u64, dt: f64) {
        // Events queued by command handling go out first.
        self.dispatch(now);

        // Bots decide and act through the same command path as clients.
        let bot_commands = self.bots.think(
            &self.world,
            &self.cfg.game,
            self.combat.dead_until(),
            &mut self.rng,
            now,
        );
        for (id, cmd) in bot_commands {
            self.apply_bot_command(id, cmd, now);
        }
        self.dispatch(now);

        // tick:pre — movement and projectile integration.
        self.movement
            .tick(&mut self.world, &self.cfg.game, &mut self.events, now, dt);
        self.dispatch(now);

        // tick:post — combat resolution and pickups.
        self.combat.tick(&mut self.world, &self.cfg.game, &mut self.events);
        self.pickups.tick(
            &mut self.world,
            &self.cfg.game,
            &self.spawn,
            &mut self.rng,
            &mut self.events,
            now,
            dt,
        );
        self.dispatch(now);

        // Scheduled work whose deadline has passed.
        while let Some(task) = self.tasks.pop_due(now) {
            match task {
                Task::JournalAutosave => {
                    self.journal.autosave(now);
                    self.tasks.schedule(
                        now + self.cfg.journal.autosave_interval_ms,
                        Task::JournalAutosave,
                    );
                }
                t => {
                    self.match_ctl.handle_task(
                        &t,
                        &mut self.world,
                        &mut self.events,
                        &mut self.tasks,
                        now,
                    );
                }
            }
            self.dispatch(now);
        }

        // HUD refresh and flush.
        let view = SimView {
            world: &self.world,
            match_state: self.match_ctl.current(),
            now,
        };
        self.hud.on_tick(&view);
        self.hud.flush_due(&view, &self.registry);

        self.update_stats();
    }

    /// Drain the event queue, delivering each event in emission order to the
    /// combat handlers, the journal, the HUD, and the broadcast fan-out.
    fn dispatch(&mut self, now: u64) {
        while let Some(event) = self.events.pop() {
            match &event {
                GameEvent::DamageApplied {
                    target_id,
                    amount,
                    source,
                    weapon,
                } => {
                    self.combat.handle_damage(
                        &mut self.world,
                        &self.cfg.game,
                        &mut self.events,
                        now,
                        *target_id,
                        *amount,
                        *source,
                        *weapon,
                    );
                }
                GameEvent::ExplosionSpawned {
                    pos,
                    radius,
                    damage,
                    source,
                } => {
                    self.combat.handle_explosion(
                        &mut self.world,
                        &self.cfg.game,
                        &mut self.events,
                        now,
                        *pos,
                        *radius,
                        *damage,
                        *source,
                    );
                }
                GameEvent::PlayerDie { player_id } => {
                    let until = self.combat.on_player_die(*player_id, now, &self.cfg.game);
                    let is_bot = self
                        .world
                        .players
                        .get(player_id)
                        .is_some_and(|p| p.is_bot);
                    if !is_bot {
                        self.registry
                            .send_to_player(*player_id, &ServerMsg::PlayerDead { until });
                    }
                }
                GameEvent::PlayerJoin { player_id, .. } => {
                    self.match_ctl.on_player_join(*player_id);
                }
                _ => {}
            }

            self.journal.observe(&event, now);
            self.hud.on_event(&event, now);
            self.registry.broadcast_event(&event);
        }
    }

    /// Handle one engine command (connection lifecycle or client frame).
    pub fn handle_command(&mut self, cmd: EngineCommand, now: u64) {
        match cmd {
            EngineCommand::Connect { conn_id } => self.handle_connect(conn_id, now),
            EngineCommand::Disconnect { conn_id } => {
                if let Some(player_id) = self.registry.remove(conn_id) {
                    self.commands
                        .leave(&mut self.world, &mut self.events, player_id);
                    self.combat.remove_player(player_id);
                }
            }
            EngineCommand::Frame { conn_id, msg } => self.handle_frame(conn_id, msg, now),
            EngineCommand::Shutdown { ack } => {
                // Only reachable from test drivers; run() intercepts this.
                self.journal.shutdown();
                let _ = ack.send(());
            }
        }
    }

    fn handle_connect(&mut self, conn_id: Uuid, now: u64) {
        self.registry
            .send_to(conn_id, &ServerMsg::Connected { ts: now });
        self.registry.send_to(
            conn_id,
            &ServerMsg::MapLoaded {
                obstacles: self.world.obstacles.clone(),
            },
        );
        // Late joiners still see the pickups already on the field.
        for pickup in self.world.pickups.values() {
            let event = GameEvent::PickupSpawned {
                id: pickup.id,
                pos: pickup.pos,
                kind: pickup.kind,
            };
            if let Ok(json) = serde_json::to_string(&event) {
                self.registry.send_raw_to(conn_id, &json.into());
            }
        }
    }

    fn handle_frame(&mut self, conn_id: Uuid, msg: ClientMsg, now: u64) {
        match msg {
            ClientMsg::Join { name } => self.handle_join(conn_id, name, now),
            ClientMsg::Move { dir } => {
                if let Some(id) = self.registry.player_of(conn_id) {
                    self.commands
                        .apply_move(&mut self.world, &self.cfg.game, now, id, dir);
                }
            }
            ClientMsg::Aim { dir } => {
                if let Some(id) = self.registry.player_of(conn_id) {
                    self.commands
                        .apply_aim(&mut self.world, &mut self.events, id, dir);
                }
            }
            ClientMsg::Cast { skill } => {
                if let Some(id) = self.registry.player_of(conn_id) {
                    self.commands.cast(
                        &mut self.world,
                        &self.cfg.game,
                        &mut self.events,
                        now,
                        id,
                        skill,
                    );
                }
            }
            ClientMsg::Respawn => {
                if let Some(id) = self.registry.player_of(conn_id) {
                    self.commands.respawn(
                        &mut self.world,
                        &self.spawn,
                        &mut self.rng,
                        &self.cfg.game,
                        &mut self.events,
                        now,
                        id,
                        self.combat.dead_until(),
                    );
                }
            }
            ClientMsg::Leave => {
                if let Some(id) = self.registry.player_of(conn_id) {
                    self.commands.leave(&mut self.world, &mut self.events, id);
                    self.combat.remove_player(id);
                    self.registry.clear_player(conn_id);
                }
            }
            ClientMsg::HudSubscribe { widgets } => {
                let keys: Vec<WidgetKey> =
                    widgets.iter().filter_map(|w| WidgetKey::parse(w)).collect();
                let added = self.registry.subscribe_hud(conn_id, &keys);
                let view = SimView {
                    world: &self.world,
                    match_state: self.match_ctl.current(),
                    now,
                };
                // Newly subscribed widgets get an immediate snapshot, to
                // this connection only.
                for key in added {
                    if let Some(snapshot) = self.hud.snapshot_for(key, &view) {
                        self.registry.send_to(conn_id, &snapshot);
                    }
                }
            }
            ClientMsg::HudUnsubscribe { widgets } => {
                let keys: Vec<WidgetKey> =
                    widgets.iter().filter_map(|w| WidgetKey::parse(w)).collect();
                self.registry.unsubscribe_hud(conn_id, &keys);
            }
        }
    }

    fn handle_join(&mut self, conn_id: Uuid, name: String, now: u64) {
        if self.registry.player_of(conn_id).is_some() {
            debug!(conn_id = %conn_id, "join from an already-bound connection, ignored");
            return;
        }

        let id = Uuid::new_v4();
        let name = sanitize_name(name, id);

        // Presence snapshot before the new player lands in the world.
        let players: Vec<PlayerSummary> = self
            .world
            .players
            .values()
            .map(|p| PlayerSummary {
                id: p.id,
                name: p.name.clone(),
                pos: p.pos,
            })
            .collect();
        let match_status = SimView {
            world: &self.world,
            match_state: self.match_ctl.current(),
            now,
        }
        .match_status();

        self.commands.join(
            &mut self.world,
            &self.spawn,
            &mut self.rng,
            &self.cfg.game,
            &mut self.events,
            now,
            id,
            name.clone(),
        );
        self.registry.bind_player(conn_id, id);

        self.registry.send_to(
            conn_id,
            &ServerMsg::SessionStarted {
                player_id: id,
                name,
                players,
                match_status: Some(match_status),
            },
        );

        info!(player_id = %id, "player joined");
    }

    fn apply_bot_command(&mut self, id: Uuid, cmd: BotCommand, now: u64) {
        match cmd {
            BotCommand::Move(dir) => {
                self.commands
                    .apply_move(&mut self.world, &self.cfg.game, now, id, dir)
            }
            BotCommand::Aim(dir) => {
                self.commands
                    .apply_aim(&mut self.world, &mut self.events, id, dir)
            }
            BotCommand::Cast(skill) => self.commands.cast(
                &mut self.world,
                &self.cfg.game,
                &mut self.events,
                now,
                id,
                skill,
            ),
            BotCommand::Respawn => self.commands.respawn(
                &mut self.world,
                &self.spawn,
                &mut self.rng,
                &self.cfg.game,
                &mut self.events,
                now,
                id,
                self.combat.dead_until(),
            ),
        }
    }

    fn update_stats(&self) {
        self.stats
            .players
            .store(self.world.players.len(), Ordering::Relaxed);
        self.stats
            .live_players
            .store(self.world.live_player_count(), Ordering::Relaxed);
        self.stats
            .projectiles
            .store(self.world.projectiles.len(), Ordering::Relaxed);
        self.stats
            .pickups
            .store(self.world.pickups.len(), Ordering::Relaxed);
    }
}

fn sanitize_name(name: String, id: Uuid) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        format!("Player_{}", &id.to_string()[..8])
    } else {
        trimmed.chars().take(24).collect()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("players", &self.world.players.len())
            .field("projectiles", &self.world.projectiles.len())
            .field("pickups", &self.world.pickups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_falls_back_and_truncates() {
        let id = Uuid::new_v4();
        assert!(sanitize_name("   ".into(), id).starts_with("Player_"));
        assert_eq!(sanitize_name("alice".into(), id), "alice");
        let long = "x".repeat(50);
        assert_eq!(sanitize_name(long, id).len(), 24);
    }
}
