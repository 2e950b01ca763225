//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::events::{FeedItem, MatchPhase, Skill};
use crate::game::world::Obstacle;
use crate::util::vec2::Vec2;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Establish a session and enter the arena
    #[serde(rename = "cmd:join")]
    Join { name: String },

    /// Movement direction; zero stops
    #[serde(rename = "cmd:move")]
    Move { dir: Vec2 },

    /// Aim direction
    #[serde(rename = "cmd:aim")]
    Aim { dir: Vec2 },

    /// Cast a skill
    #[serde(rename = "cmd:cast")]
    Cast { skill: Skill },

    /// Respawn after the death lockout
    #[serde(rename = "cmd:respawn")]
    Respawn,

    /// Leave the arena (connection close implies this)
    #[serde(rename = "cmd:leave")]
    Leave,

    /// Subscribe to HUD widget streams
    #[serde(rename = "cmd:hud:subscribe")]
    HudSubscribe { widgets: Vec<String> },

    /// Unsubscribe from HUD widget streams
    #[serde(rename = "cmd:hud:unsubscribe")]
    HudUnsubscribe { widgets: Vec<String> },
}

/// HUD widget keys a connection may subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKey {
    Scoreboard,
    Match,
    Feed,
    Streaks,
    Announcements,
}

impl WidgetKey {
    pub const ALL: [WidgetKey; 5] = [
        WidgetKey::Scoreboard,
        WidgetKey::Match,
        WidgetKey::Feed,
        WidgetKey::Streaks,
        WidgetKey::Announcements,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKey::Scoreboard => "scoreboard",
            WidgetKey::Match => "match",
            WidgetKey::Feed => "feed",
            WidgetKey::Streaks => "streaks",
            WidgetKey::Announcements => "announcements",
        }
    }

    /// Parse a client-supplied widget name; unknown names are dropped.
    pub fn parse(s: &str) -> Option<WidgetKey> {
        match s {
            "scoreboard" => Some(WidgetKey::Scoreboard),
            "match" => Some(WidgetKey::Match),
            "feed" => Some(WidgetKey::Feed),
            "streaks" => Some(WidgetKey::Streaks),
            "announcements" => Some(WidgetKey::Announcements),
            _ => None,
        }
    }
}

/// Another player's presence, sent in the session welcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: Uuid,
    pub name: String,
    pub pos: Vec2,
}

/// Current match description for session frames and the match widget
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub phase: MatchPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<u64>,
}

impl MatchStatus {
    pub fn idle() -> Self {
        Self {
            id: None,
            mode: None,
            phase: MatchPhase::Idle,
            starts_at: None,
            ends_at: None,
        }
    }
}

/// One scoreboard row, pre-sorted server-side
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardRow {
    pub player_id: Uuid,
    pub name: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub hp: f64,
    pub is_dead: bool,
}

/// A streak milestone announcement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub player_id: Uuid,
    pub category: String,
    pub streak: u32,
    pub timestamp: u64,
}

/// Targeted frames from server to client. Broadcast simulation events go on
/// the wire in their own serialized form; these are the session, map, and
/// HUD frames addressed to specific connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    /// Welcome frame after connect
    #[serde(rename = "connected")]
    Connected { ts: u64 },

    /// Session established for this connection
    #[serde(rename = "session:started", rename_all = "camelCase")]
    SessionStarted {
        player_id: Uuid,
        name: String,
        players: Vec<PlayerSummary>,
        #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
        match_status: Option<MatchStatus>,
    },

    /// Private to the dying player: when respawn becomes available
    #[serde(rename = "player:dead")]
    PlayerDead { until: u64 },

    /// Static obstacle layout, sent once per connection
    #[serde(rename = "map:loaded")]
    MapLoaded { obstacles: Vec<Obstacle> },

    #[serde(rename = "hud:scoreboard:update")]
    ScoreboardUpdate { rows: Vec<ScoreboardRow> },

    #[serde(rename = "hud:match:update")]
    MatchUpdate {
        #[serde(flatten)]
        match_status: MatchStatus,
    },

    #[serde(rename = "hud:feed:update")]
    FeedUpdate { items: Vec<FeedItem> },

    #[serde(rename = "hud:streaks:update")]
    StreaksUpdate { streaks: HashMap<Uuid, u32> },

    #[serde(rename = "hud:announce:update")]
    AnnounceUpdate { items: Vec<Announcement> },
}
