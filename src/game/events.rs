//! Simulation event definitions.
//!
//! Every state change in the simulation is expressed as one variant of
//! [`GameEvent`]. The engine drains emitted events in order and hands each
//! one to the combat handlers, the journal, the HUD projection, and the
//! broadcast fan-out. The serialized form doubles as the wire frame for
//! broadcastable events: the `type` tag carries the protocol event name.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::vec2::Vec2;

/// Projectile kinds with distinct flight and bounce behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectileKind {
    Bullet,
    Pellet,
    Rocket,
}

impl ProjectileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectileKind::Bullet => "bullet",
            ProjectileKind::Pellet => "pellet",
            ProjectileKind::Rocket => "rocket",
        }
    }
}

/// Damage source tag carried on `damage:applied` and the kill feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weapon {
    Bullet,
    Pellet,
    Rocket,
    Explosion,
}

impl From<ProjectileKind> for Weapon {
    fn from(kind: ProjectileKind) -> Self {
        match kind {
            ProjectileKind::Bullet => Weapon::Bullet,
            ProjectileKind::Pellet => Weapon::Pellet,
            ProjectileKind::Rocket => Weapon::Rocket,
        }
    }
}

/// Pickup and buff kinds share one tag set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupKind {
    Heal,
    Haste,
    Shield,
}

/// Castable skills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Skill {
    #[serde(rename = "skill:shoot")]
    Shoot,
    #[serde(rename = "skill:shotgun")]
    Shotgun,
    #[serde(rename = "skill:rocket")]
    Rocket,
    #[serde(rename = "skill:dash")]
    Dash,
}

impl Skill {
    pub fn as_str(&self) -> &'static str {
        match self {
            Skill::Shoot => "skill:shoot",
            Skill::Shotgun => "skill:shotgun",
            Skill::Rocket => "skill:rocket",
            Skill::Dash => "skill:dash",
        }
    }
}

/// Match lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Idle,
    Countdown,
    Active,
    Ended,
}

/// One entry of the kill feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub killer: Uuid,
    pub victim: Uuid,
    pub weapon: Weapon,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assist_ids: Vec<Uuid>,
    pub timestamp: u64,
}

/// The simulation event union. Serialized with the protocol's `type` tag so
/// broadcastable variants go on the wire as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    #[serde(rename = "player:join", rename_all = "camelCase")]
    PlayerJoin {
        player_id: Uuid,
        name: String,
        pos: Vec2,
        hp: f64,
    },

    #[serde(rename = "player:move", rename_all = "camelCase")]
    PlayerMove { player_id: Uuid, pos: Vec2 },

    #[serde(rename = "player:aimed", rename_all = "camelCase")]
    PlayerAimed { player_id: Uuid, dir: Vec2 },

    #[serde(rename = "player:die", rename_all = "camelCase")]
    PlayerDie { player_id: Uuid },

    #[serde(rename = "player:kill", rename_all = "camelCase")]
    PlayerKill {
        killer_id: Uuid,
        victim_id: Uuid,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        assist_ids: Vec<Uuid>,
    },

    #[serde(rename = "player:leave", rename_all = "camelCase")]
    PlayerLeave { player_id: Uuid },

    #[serde(rename = "projectile:spawned", rename_all = "camelCase")]
    ProjectileSpawned {
        id: Uuid,
        owner: Uuid,
        kind: ProjectileKind,
        pos: Vec2,
        vel: Vec2,
    },

    #[serde(rename = "projectile:moved", rename_all = "camelCase")]
    ProjectileMoved { id: Uuid, pos: Vec2 },

    #[serde(rename = "projectile:despawned", rename_all = "camelCase")]
    ProjectileDespawned { id: Uuid },

    #[serde(rename = "projectile:bounced", rename_all = "camelCase")]
    ProjectileBounced { id: Uuid, normal: Vec2 },

    #[serde(rename = "damage:applied", rename_all = "camelCase")]
    DamageApplied {
        target_id: Uuid,
        amount: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<Uuid>,
        weapon: Weapon,
    },

    #[serde(rename = "explosion:spawned", rename_all = "camelCase")]
    ExplosionSpawned {
        pos: Vec2,
        radius: f64,
        damage: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<Uuid>,
    },

    #[serde(rename = "knockback:applied", rename_all = "camelCase")]
    KnockbackApplied {
        player_id: Uuid,
        vx: f64,
        vy: f64,
        duration: u64,
    },

    #[serde(rename = "dash:started", rename_all = "camelCase")]
    DashStarted {
        player_id: Uuid,
        duration: u64,
        iframes: bool,
    },

    #[serde(rename = "dash:ended", rename_all = "camelCase")]
    DashEnded { player_id: Uuid },

    #[serde(rename = "pickup:spawned", rename_all = "camelCase")]
    PickupSpawned {
        id: Uuid,
        pos: Vec2,
        kind: PickupKind,
    },

    #[serde(rename = "pickup:collected", rename_all = "camelCase")]
    PickupCollected { id: Uuid, by: Uuid },

    #[serde(rename = "buff:applied", rename_all = "camelCase")]
    BuffApplied {
        player_id: Uuid,
        kind: PickupKind,
        duration: u64,
    },

    #[serde(rename = "buff:expired", rename_all = "camelCase")]
    BuffExpired { player_id: Uuid, kind: PickupKind },

    #[serde(rename = "match:created", rename_all = "camelCase")]
    MatchCreated {
        match_id: Uuid,
        mode: String,
        countdown_ms: u64,
    },

    #[serde(rename = "match:started", rename_all = "camelCase")]
    MatchStarted {
        match_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        ends_at: Option<u64>,
    },

    #[serde(rename = "match:ended", rename_all = "camelCase")]
    MatchEnded { match_id: Uuid, at: u64 },

    #[serde(rename = "score:update", rename_all = "camelCase")]
    ScoreUpdate {
        player_id: Uuid,
        kills: u32,
        deaths: u32,
        assists: u32,
    },

    #[serde(rename = "feed:entry")]
    FeedEntry(FeedItem),

    #[serde(rename = "streak:changed", rename_all = "camelCase")]
    StreakChanged {
        player_id: Uuid,
        streak: u32,
        previous_streak: u32,
    },
}

impl GameEvent {
    /// The protocol event-type string, identical to the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::PlayerJoin { .. } => "player:join",
            GameEvent::PlayerMove { .. } => "player:move",
            GameEvent::PlayerAimed { .. } => "player:aimed",
            GameEvent::PlayerDie { .. } => "player:die",
            GameEvent::PlayerKill { .. } => "player:kill",
            GameEvent::PlayerLeave { .. } => "player:leave",
            GameEvent::ProjectileSpawned { .. } => "projectile:spawned",
            GameEvent::ProjectileMoved { .. } => "projectile:moved",
            GameEvent::ProjectileDespawned { .. } => "projectile:despawned",
            GameEvent::ProjectileBounced { .. } => "projectile:bounced",
            GameEvent::DamageApplied { .. } => "damage:applied",
            GameEvent::ExplosionSpawned { .. } => "explosion:spawned",
            GameEvent::KnockbackApplied { .. } => "knockback:applied",
            GameEvent::DashStarted { .. } => "dash:started",
            GameEvent::DashEnded { .. } => "dash:ended",
            GameEvent::PickupSpawned { .. } => "pickup:spawned",
            GameEvent::PickupCollected { .. } => "pickup:collected",
            GameEvent::BuffApplied { .. } => "buff:applied",
            GameEvent::BuffExpired { .. } => "buff:expired",
            GameEvent::MatchCreated { .. } => "match:created",
            GameEvent::MatchStarted { .. } => "match:started",
            GameEvent::MatchEnded { .. } => "match:ended",
            GameEvent::ScoreUpdate { .. } => "score:update",
            GameEvent::FeedEntry(_) => "feed:entry",
            GameEvent::StreakChanged { .. } => "streak:changed",
        }
    }
}

/// Event kinds fanned out to every connected client. The list is explicit so
/// an internal-only kind added later stays off the wire until opted in.
pub const BROADCAST_EVENT_KINDS: &[&str] = &[
    "player:join",
    "player:move",
    "player:aimed",
    "player:die",
    "player:kill",
    "player:leave",
    "projectile:spawned",
    "projectile:moved",
    "projectile:despawned",
    "projectile:bounced",
    "damage:applied",
    "explosion:spawned",
    "knockback:applied",
    "dash:started",
    "dash:ended",
    "pickup:spawned",
    "pickup:collected",
    "buff:applied",
    "buff:expired",
    "match:created",
    "match:started",
    "match:ended",
    "score:update",
    "feed:entry",
    "streak:changed",
];

/// Ordered FIFO of emitted events, drained by the engine's dispatch loop.
/// Systems take `&mut EventQueue` and push; handler-emitted events keep
/// global emission order.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: std::collections::VecDeque<GameEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: GameEvent) {
        self.queue.push_back(event);
    }

    pub fn pop(&mut self) -> Option<GameEvent> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drain everything currently queued (test helper and welcome replay).
    pub fn drain(&mut self) -> Vec<GameEvent> {
        self.queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_protocol_type_tag() {
        let id = Uuid::new_v4();
        let event = GameEvent::PlayerDie { player_id: id };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "player:die");
        assert_eq!(json["playerId"], serde_json::json!(id));
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let events = vec![
            GameEvent::PlayerMove {
                player_id: Uuid::new_v4(),
                pos: Vec2::new(1.0, 2.0),
            },
            GameEvent::DamageApplied {
                target_id: Uuid::new_v4(),
                amount: 25.0,
                source: Some(Uuid::new_v4()),
                weapon: Weapon::Bullet,
            },
            GameEvent::MatchCreated {
                match_id: Uuid::new_v4(),
                mode: "demo".to_string(),
                countdown_ms: 3000,
            },
            GameEvent::FeedEntry(FeedItem {
                killer: Uuid::new_v4(),
                victim: Uuid::new_v4(),
                weapon: Weapon::Pellet,
                assist_ids: vec![],
                timestamp: 1,
            }),
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.kind());
        }
    }

    #[test]
    fn every_kind_is_broadcastable() {
        let event = GameEvent::StreakChanged {
            player_id: Uuid::new_v4(),
            streak: 3,
            previous_streak: 2,
        };
        assert!(BROADCAST_EVENT_KINDS.contains(&event.kind()));
    }

    #[test]
    fn empty_assists_are_omitted_from_the_wire() {
        let event = GameEvent::PlayerKill {
            killer_id: Uuid::new_v4(),
            victim_id: Uuid::new_v4(),
            assist_ids: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("assistIds").is_none());
    }

    #[test]
    fn skill_names_round_trip() {
        let s: Skill = serde_json::from_str("\"skill:shotgun\"").unwrap();
        assert_eq!(s, Skill::Shotgun);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"skill:shotgun\"");
    }

    #[test]
    fn queue_preserves_emission_order() {
        let mut q = EventQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        q.emit(GameEvent::PlayerDie { player_id: a });
        q.emit(GameEvent::PlayerDie { player_id: b });

        match q.pop().unwrap() {
            GameEvent::PlayerDie { player_id } => assert_eq!(player_id, a),
            other => panic!("unexpected event {other:?}"),
        }
        match q.pop().unwrap() {
            GameEvent::PlayerDie { player_id } => assert_eq!(player_id, b),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(q.pop().is_none());
    }
}
