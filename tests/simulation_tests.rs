//! End-to-end simulation scenarios driven through the engine.
//!
//! These tests wire a real engine with a connection registry and feed it
//! decoded client frames, then step simulated time and assert on the frames
//! that reach the registered connections.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use arena_server::config::{Config, GameConfig, JournalConfig};
use arena_server::game::events::Skill;
use arena_server::game::world::Obstacle;
use arena_server::game::{Engine, EngineCommand, EngineStats};
use arena_server::journal::SaveJob;
use arena_server::util::vec2::Vec2;
use arena_server::ws::protocol::ClientMsg;
use arena_server::ws::registry::ConnectionRegistry;

const TICK_MS: u64 = 33;
const DT: f64 = 1.0 / 30.0;

struct Harness {
    engine: Engine,
    registry: Arc<ConnectionRegistry>,
    // Held so the engine's command channel stays open.
    _command_tx: mpsc::Sender<EngineCommand>,
    journal_rx: Option<mpsc::Receiver<SaveJob>>,
    now: u64,
}

struct Client {
    conn_id: Uuid,
    rx: mpsc::Receiver<Arc<str>>,
    player_id: Option<Uuid>,
}

impl Harness {
    fn new(journal: bool) -> Self {
        Self::new_with(journal, |_| {})
    }

    /// Harness with a tweaked game config. Combat-focused scenarios push the
    /// match countdown far out so a mid-test stat reset cannot interfere.
    fn new_with(journal: bool, tweak: impl FnOnce(&mut GameConfig)) -> Self {
        let (journal_tx, journal_rx) = if journal {
            let (tx, rx) = mpsc::channel(64);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut game = GameConfig::default();
        tweak(&mut game);

        let config = Arc::new(Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".into(),
            client_origin: "*".into(),
            bot_count: 0,
            journal: JournalConfig {
                disabled: !journal,
                ..JournalConfig::default()
            },
            game,
        });

        let registry = Arc::new(ConnectionRegistry::new());
        let (command_tx, command_rx) = mpsc::channel(64);
        let now = 1_000_000;
        let mut engine = Engine::new(
            config,
            registry.clone(),
            command_rx,
            journal_tx,
            Arc::new(EngineStats::default()),
            now,
        );
        engine.bootstrap(now);

        Self {
            engine,
            registry,
            _command_tx: command_tx,
            journal_rx,
            now,
        }
    }

    fn connect(&mut self) -> Client {
        let conn_id = Uuid::new_v4();
        let rx = self.registry.register(conn_id);
        self.engine
            .handle_command(EngineCommand::Connect { conn_id }, self.now);
        Client {
            conn_id,
            rx,
            player_id: None,
        }
    }

    fn join(&mut self, client: &mut Client, name: &str) {
        self.send(
            client,
            ClientMsg::Join {
                name: name.to_string(),
            },
        );
        self.tick();
        client.player_id = self.registry.player_of(client.conn_id);
        assert!(client.player_id.is_some(), "join should bind the connection");
    }

    fn send(&mut self, client: &Client, msg: ClientMsg) {
        self.engine.handle_command(
            EngineCommand::Frame {
                conn_id: client.conn_id,
                msg,
            },
            self.now,
        );
    }

    fn tick(&mut self) {
        self.now += TICK_MS;
        self.engine.step(self.now, DT);
    }

    fn tick_for(&mut self, ms: u64) {
        let ticks = ms / TICK_MS + 1;
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Jump simulated time without integrating the gap.
    fn jump_to(&mut self, now: u64) {
        self.now = now;
        self.engine.step(self.now, DT);
    }
}

impl Client {
    fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    fn drain_of_type(&mut self, ty: &str) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter(|f| f["type"] == ty)
            .collect()
    }
}

fn frames_of<'a>(frames: &'a [Value], ty: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["type"] == ty).collect()
}

#[test]
fn connect_sends_welcome_map_and_session() {
    let mut h = Harness::new(false);
    let mut alice = h.connect();

    let frames = alice.drain();
    assert_eq!(frames[0]["type"], "connected");
    assert_eq!(frames[1]["type"], "map:loaded");
    assert!(frames[1]["obstacles"].as_array().unwrap().len() > 0);

    h.join(&mut alice, "alice");
    let frames = alice.drain();
    let session = frames_of(&frames, "session:started");
    assert_eq!(session.len(), 1);
    assert_eq!(session[0]["name"], "alice");
    assert_eq!(session[0]["players"].as_array().unwrap().len(), 0);
    assert!(session[0]["match"].is_object());
    // The join broadcast follows the private session frame.
    assert_eq!(frames_of(&frames, "player:join").len(), 1);
}

#[test]
fn second_joiner_sees_existing_players() {
    let mut h = Harness::new(false);
    let mut alice = h.connect();
    h.join(&mut alice, "alice");
    alice.drain();

    let mut bob = h.connect();
    h.join(&mut bob, "bob");

    let frames = bob.drain();
    let session = frames_of(&frames, "session:started");
    let listed = session[0]["players"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "alice");

    // Alice sees bob's join broadcast.
    let alice_frames = alice.drain();
    assert!(frames_of(&alice_frames, "player:join").len() >= 1);
}

#[test]
fn lone_shot_spawns_then_despawns() {
    let mut h = Harness::new(false);
    let mut alice = h.connect();
    h.join(&mut alice, "alice");

    h.send(&mut alice, ClientMsg::Aim { dir: Vec2::new(1.0, 0.0) });
    h.tick();
    h.send(
        &mut alice,
        ClientMsg::Cast { skill: Skill::Shoot },
    );
    h.tick();

    let frames = alice.drain();
    let spawned = frames_of(&frames, "projectile:spawned");
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0]["kind"], "bullet");

    // Within the bullet lifetime the projectile despawns (wall, bounds, or
    // expiry).
    let lifetime = GameConfig::default().projectiles.bullet.lifetime_ms;
    h.tick_for(lifetime + 100);
    let frames = alice.drain();
    assert!(frames_of(&frames, "projectile:despawned").len() >= 1);
    assert!(h.engine.world().projectiles.is_empty());
}

#[test]
fn bullet_kill_with_assist_and_respawn_flow() {
    let mut h = Harness::new_with(false, |g| g.arena_match.countdown_ms = 10_000_000);
    let mut p1 = h.connect();
    let mut p2 = h.connect();
    let mut p3 = h.connect();
    h.join(&mut p1, "p1");
    h.join(&mut p2, "p2");
    h.join(&mut p3, "p3");
    let (id1, id2, id3) = (
        p1.player_id.unwrap(),
        p2.player_id.unwrap(),
        p3.player_id.unwrap(),
    );

    // Clear lanes: no obstacles, fixed positions on converging lines.
    {
        let world = h.engine.world_mut();
        world.obstacles.clear();
        world.players.get_mut(&id1).unwrap().pos = Vec2::new(400.0, 550.0);
        world.players.get_mut(&id2).unwrap().pos = Vec2::new(400.0, 650.0);
        let p3_state = world.players.get_mut(&id3).unwrap();
        p3_state.pos = Vec2::new(700.0, 600.0);
        p3_state.hp = 50.0;
    }

    // Both attackers aim straight at the victim and fire together.
    h.send(&mut p1, ClientMsg::Aim { dir: Vec2::new(300.0, 50.0) });
    h.send(&mut p2, ClientMsg::Aim { dir: Vec2::new(300.0, -50.0) });
    h.tick();
    h.tick();
    h.send(
        &mut p1,
        ClientMsg::Cast { skill: Skill::Shoot },
    );
    h.send(
        &mut p2,
        ClientMsg::Cast { skill: Skill::Shoot },
    );
    h.tick_for(1000);

    let frames = p3.drain();
    let kills = frames_of(&frames, "player:kill");
    assert_eq!(kills.len(), 1);
    assert_eq!(kills[0]["victimId"], serde_json::json!(id3));
    let killer: Uuid = serde_json::from_value(kills[0]["killerId"].clone()).unwrap();
    let assists: Vec<Uuid> = kills[0]["assistIds"]
        .as_array()
        .map(|a| {
            a.iter()
                .map(|v| serde_json::from_value(v.clone()).unwrap())
                .collect()
        })
        .unwrap_or_default();
    // One attacker landed the killing blow; the other assisted.
    assert!(killer == id1 || killer == id2);
    let other = if killer == id1 { id2 } else { id1 };
    assert_eq!(assists, vec![other]);

    assert_eq!(frames_of(&frames, "feed:entry").len(), 1);
    assert_eq!(frames_of(&frames, "player:die").len(), 1);
    assert_eq!(frames_of(&frames, "score:update").len(), 3);
    // The dying player got the private respawn timer frame.
    assert_eq!(frames_of(&frames, "player:dead").len(), 1);

    assert!(h.engine.world().players[&id3].is_dead);

    // Respawn before the lockout is dropped.
    h.send(&mut p3, ClientMsg::Respawn);
    h.tick();
    assert!(h.engine.world().players[&id3].is_dead);

    // After the lockout the player comes back with full HP and stats intact.
    let respawn_delay = GameConfig::default().combat.respawn_delay_ms;
    h.now += respawn_delay;
    h.send(&mut p3, ClientMsg::Respawn);
    {
        let p3_state = &h.engine.world().players[&id3];
        assert!(!p3_state.is_dead);
        assert_eq!(p3_state.hp, 100.0);
        assert_eq!(p3_state.stats.deaths, 1);
    }
    h.tick();

    let frames = p3.drain();
    assert!(frames_of(&frames, "player:join").len() >= 1);
}

#[test]
fn rocket_splash_hits_bystanders_with_opposite_knockback() {
    let mut h = Harness::new(false);
    let mut p1 = h.connect();
    let mut p2 = h.connect();
    let mut p3 = h.connect();
    h.join(&mut p1, "p1");
    h.join(&mut p2, "p2");
    h.join(&mut p3, "p3");
    let (id1, id2, id3) = (
        p1.player_id.unwrap(),
        p2.player_id.unwrap(),
        p3.player_id.unwrap(),
    );

    {
        let world = h.engine.world_mut();
        world.obstacles.clear();
        world
            .obstacles
            .push(Obstacle::rect(600.0, 0.0, 80.0, 1200.0));
        world.players.get_mut(&id1).unwrap().pos = Vec2::new(300.0, 600.0);
        world.players.get_mut(&id2).unwrap().pos = Vec2::new(560.0, 560.0);
        world.players.get_mut(&id3).unwrap().pos = Vec2::new(560.0, 640.0);
    }

    h.send(&mut p1, ClientMsg::Aim { dir: Vec2::new(1.0, 0.0) });
    h.tick();
    h.send(
        &mut p1,
        ClientMsg::Cast {
            skill: Skill::Rocket,
        },
    );
    h.tick_for(1500);

    let frames = p1.drain();
    let explosions = frames_of(&frames, "explosion:spawned");
    assert_eq!(explosions.len(), 1);

    let splash: Vec<&Value> = frames_of(&frames, "damage:applied")
        .into_iter()
        .filter(|f| f["weapon"] == "explosion")
        .collect();
    assert_eq!(splash.len(), 2);

    let knockbacks = frames_of(&frames, "knockback:applied");
    assert_eq!(knockbacks.len(), 2);
    // Bystanders sit on opposite sides of the blast in y: knockback normals
    // point away from the center in opposite directions.
    let vys: Vec<f64> = knockbacks.iter().map(|f| f["vy"].as_f64().unwrap()).collect();
    assert!(vys.iter().any(|&v| v < 0.0));
    assert!(vys.iter().any(|&v| v > 0.0));
}

#[test]
fn dash_iframes_ignore_incoming_bullet() {
    let mut h = Harness::new(false);
    let mut p1 = h.connect();
    let mut p2 = h.connect();
    h.join(&mut p1, "p1");
    h.join(&mut p2, "p2");
    let (id1, id2) = (p1.player_id.unwrap(), p2.player_id.unwrap());

    {
        let world = h.engine.world_mut();
        world.obstacles.clear();
        world.players.get_mut(&id1).unwrap().pos = Vec2::new(440.0, 600.0);
        world.players.get_mut(&id2).unwrap().pos = Vec2::new(500.0, 600.0);
    }

    h.send(&mut p1, ClientMsg::Aim { dir: Vec2::new(1.0, 0.0) });
    h.tick();

    // P2 dashes (gaining i-frames) as P1 fires from close range.
    h.send(
        &mut p2,
        ClientMsg::Cast {
            skill: Skill::Dash,
        },
    );
    h.send(
        &mut p1,
        ClientMsg::Cast { skill: Skill::Shoot },
    );
    h.tick_for(200);

    let frames = p2.drain();
    assert!(frames_of(&frames, "dash:started").len() == 1);
    // The projectile was consumed on contact but the damage was ignored.
    assert_eq!(frames_of(&frames, "player:die").len(), 0);
    let p2_state = &h.engine.world().players[&id2];
    assert_eq!(p2_state.hp, 100.0);
    assert!(!p2_state.is_dead);
}

#[test]
fn streak_announcement_reaches_subscribers() {
    let mut h = Harness::new_with(false, |g| g.arena_match.countdown_ms = 10_000_000);
    let mut p1 = h.connect();
    let mut p2 = h.connect();
    h.join(&mut p1, "p1");
    h.join(&mut p2, "p2");
    let (id1, id2) = (p1.player_id.unwrap(), p2.player_id.unwrap());

    let mut watcher = h.connect();
    h.send(
        &mut watcher,
        ClientMsg::HudSubscribe {
            widgets: vec!["announcements".into(), "streaks".into()],
        },
    );
    h.tick();
    watcher.drain();

    let respawn_delay = GameConfig::default().combat.respawn_delay_ms;

    for kill in 0..2 {
        {
            let world = h.engine.world_mut();
            world.obstacles.clear();
            world.players.get_mut(&id1).unwrap().pos = Vec2::new(400.0, 600.0);
            let victim = world.players.get_mut(&id2).unwrap();
            victim.pos = Vec2::new(500.0, 600.0);
            victim.hp = 25.0;
        }
        h.send(&mut p1, ClientMsg::Aim { dir: Vec2::new(1.0, 0.0) });
        h.tick();
        h.send(
            &mut p1,
            ClientMsg::Cast {
                skill: Skill::Shoot,
            },
        );
        h.tick_for(400);
        assert!(h.engine.world().players[&id2].is_dead, "kill {kill} landed");

        if kill == 0 {
            h.now += respawn_delay;
            h.send(&mut p2, ClientMsg::Respawn);
            h.tick();
        }
    }

    assert_eq!(h.engine.world().players[&id1].stats.current_streak, 2);

    let frames = watcher.drain();
    let announcements = frames_of(&frames, "hud:announce:update");
    assert!(!announcements.is_empty());
    let last = announcements.last().unwrap();
    let items = last["items"].as_array().unwrap();
    assert_eq!(items.last().unwrap()["category"], "double_kill");

    assert!(!frames_of(&frames, "hud:streaks:update").is_empty());
}

#[test]
fn hud_subscribe_gets_immediate_snapshot_and_unsubscribe_stops_updates() {
    let mut h = Harness::new(false);
    let mut alice = h.connect();
    h.join(&mut alice, "alice");
    alice.drain();

    h.send(
        &mut alice,
        ClientMsg::HudSubscribe {
            widgets: vec!["scoreboard".into(), "not_a_widget".into()],
        },
    );
    let snapshots = alice.drain_of_type("hud:scoreboard:update");
    assert_eq!(snapshots.len(), 1, "initial snapshot is immediate");
    assert_eq!(snapshots[0]["rows"].as_array().unwrap().len(), 1);

    // Duplicate subscribe: no second initial snapshot.
    h.send(
        &mut alice,
        ClientMsg::HudSubscribe {
            widgets: vec!["scoreboard".into()],
        },
    );
    assert!(alice.drain_of_type("hud:scoreboard:update").is_empty());

    h.send(
        &mut alice,
        ClientMsg::HudUnsubscribe {
            widgets: vec!["scoreboard".into()],
        },
    );
    // A scoreboard-dirtying event now produces nothing for this connection.
    let mut bob = h.connect();
    h.join(&mut bob, "bob");
    h.tick_for(100);
    assert!(alice.drain_of_type("hud:scoreboard:update").is_empty());
}

#[test]
fn leave_emits_player_leave_and_allows_rejoin() {
    let mut h = Harness::new(false);
    let mut alice = h.connect();
    let mut bob = h.connect();
    h.join(&mut alice, "alice");
    h.join(&mut bob, "bob");
    bob.drain();

    h.send(&mut alice, ClientMsg::Leave);
    h.tick();

    let frames = bob.drain();
    assert_eq!(frames_of(&frames, "player:leave").len(), 1);
    assert_eq!(h.engine.world().players.len(), 1);

    // The same connection can join again.
    h.join(&mut alice, "alice2");
    assert_eq!(h.engine.world().players.len(), 2);
}

#[test]
fn match_lifecycle_resets_stats_and_restarts() {
    let mut h = Harness::new(false);
    let mut alice = h.connect();
    h.join(&mut alice, "alice");
    let id = alice.player_id.unwrap();
    h.engine.world_mut().players.get_mut(&id).unwrap().stats.kills = 5;

    let game = GameConfig::default();
    let t0 = 1_000_000;

    // Through the countdown: match goes active and stats reset.
    h.jump_to(t0 + game.arena_match.countdown_ms + TICK_MS);
    let frames = alice.drain();
    assert!(!frames_of(&frames, "match:started").is_empty());
    assert_eq!(h.engine.world().players[&id].stats.kills, 0);

    // Through the duration: the match ends.
    let duration = game.arena_match.duration_ms.unwrap();
    h.jump_to(h.now + duration + TICK_MS);
    let frames = alice.drain();
    assert!(!frames_of(&frames, "match:ended").is_empty());

    // After the clear delay a fresh demo match is created.
    h.jump_to(h.now + game.arena_match.clear_delay_ms + TICK_MS);
    let frames = alice.drain();
    assert!(!frames_of(&frames, "match:created").is_empty());
}

#[test]
fn journal_rotates_across_match_boundaries() {
    let mut h = Harness::new(true);
    let mut alice = h.connect();
    h.join(&mut alice, "alice");

    let game = GameConfig::default();
    let t0 = 1_000_000;

    // The bootstrap match (M1) is the current journal scope.
    let m1_journal_id = h.engine.journal().current().unwrap().id.clone();
    assert!(m1_journal_id.starts_with("match_"));

    // Run M1 to its end.
    h.jump_to(t0 + game.arena_match.countdown_ms + TICK_MS);
    let duration = game.arena_match.duration_ms.unwrap();
    h.jump_to(h.now + duration + TICK_MS);

    // The ended match journal was saved with both boundary events.
    let mut journal_rx = h.journal_rx.take().unwrap();
    let mut saved = Vec::new();
    while let Ok(job) = journal_rx.try_recv() {
        saved.push(job);
    }
    // Auto-saves of the same journal may precede the final rotation save;
    // the last one carries the complete entry list.
    let m1_save = saved
        .iter()
        .rev()
        .find(|j| j.snapshot.id == m1_journal_id)
        .expect("match journal saved on match:ended");
    let kinds: Vec<&str> = m1_save
        .snapshot
        .entries
        .iter()
        .map(|e| e.event_type.as_str())
        .collect();
    assert_eq!(kinds.first(), Some(&"match:created"));
    assert_eq!(kinds.last(), Some(&"match:ended"));

    // Between matches, events land in a session-scoped journal.
    assert!(h
        .engine
        .journal()
        .current()
        .unwrap()
        .id
        .starts_with("session_"));

    // The restart opens a match journal for M2 holding its creation event.
    h.jump_to(h.now + game.arena_match.clear_delay_ms + TICK_MS);
    let m2 = h.engine.journal().current().unwrap();
    assert!(m2.id.starts_with("match_"));
    assert_ne!(m2.id, m1_journal_id);
    assert!(m2
        .entries
        .iter()
        .any(|e| e.event_type == "match:created"));
}
