//! The five HUD widgets.

use uuid::Uuid;

use crate::game::events::{FeedItem, GameEvent};
use crate::hud::SimView;
use crate::ws::protocol::{Announcement, MatchStatus, ScoreboardRow, ServerMsg, WidgetKey};

/// Kill-feed retention
const FEED_MAX_ITEMS: usize = 8;
const FEED_TTL_MS: u64 = 10_000;

/// Announcement retention
const ANNOUNCE_MAX_ITEMS: usize = 5;
const ANNOUNCE_TTL_MS: u64 = 3_000;

/// Tick-driven match widget refresh floor
const MATCH_TICK_THROTTLE_MS: u64 = 300;

/// Streak milestones, lowest to highest
const STREAK_THRESHOLDS: [(u32, &str); 5] = [
    (2, "double_kill"),
    (3, "killing_spree"),
    (5, "rampage"),
    (7, "unstoppable"),
    (10, "legendary"),
];

/// A server-side HUD widget: a snapshot function plus change detection.
pub trait Widget {
    fn key(&self) -> WidgetKey;

    /// May this event have changed the widget's output?
    fn on_event(&mut self, event: &GameEvent, now: u64) -> bool;

    /// Tick-driven change detection (TTL expiry, throttled refresh).
    fn on_tick(&mut self, _view: &SimView) -> bool {
        false
    }

    /// Build the current snapshot frame.
    fn snapshot(&self, view: &SimView) -> ServerMsg;
}

/// Scoreboard: one row per player, sorted by kills desc, deaths asc, name.
pub struct ScoreboardWidget;

impl Widget for ScoreboardWidget {
    fn key(&self) -> WidgetKey {
        WidgetKey::Scoreboard
    }

    fn on_event(&mut self, event: &GameEvent, _now: u64) -> bool {
        matches!(
            event,
            GameEvent::ScoreUpdate { .. }
                | GameEvent::PlayerJoin { .. }
                | GameEvent::PlayerLeave { .. }
                | GameEvent::PlayerDie { .. }
        )
    }

    fn snapshot(&self, view: &SimView) -> ServerMsg {
        let mut rows: Vec<ScoreboardRow> = view
            .world
            .players
            .values()
            .map(|p| ScoreboardRow {
                player_id: p.id,
                name: p.name.clone(),
                kills: p.stats.kills,
                deaths: p.stats.deaths,
                assists: p.stats.assists,
                hp: p.hp,
                is_dead: p.is_dead,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.kills
                .cmp(&a.kills)
                .then(a.deaths.cmp(&b.deaths))
                .then(a.name.cmp(&b.name))
        });
        ServerMsg::ScoreboardUpdate { rows }
    }
}

/// Match widget: phase and timing, immediate on lifecycle events, throttled
/// on ticks.
pub struct MatchWidget {
    last_tick_status: Option<MatchStatus>,
    last_tick_emit: u64,
}

impl MatchWidget {
    pub fn new() -> Self {
        Self {
            last_tick_status: None,
            last_tick_emit: 0,
        }
    }
}

impl Widget for MatchWidget {
    fn key(&self) -> WidgetKey {
        WidgetKey::Match
    }

    fn on_event(&mut self, event: &GameEvent, _now: u64) -> bool {
        matches!(
            event,
            GameEvent::MatchCreated { .. }
                | GameEvent::MatchStarted { .. }
                | GameEvent::MatchEnded { .. }
        )
    }

    fn on_tick(&mut self, view: &SimView) -> bool {
        if view.now.saturating_sub(self.last_tick_emit) < MATCH_TICK_THROTTLE_MS {
            return false;
        }
        let status = view.match_status();
        if self.last_tick_status.as_ref() == Some(&status) {
            return false;
        }
        self.last_tick_emit = view.now;
        self.last_tick_status = Some(status);
        true
    }

    fn snapshot(&self, view: &SimView) -> ServerMsg {
        ServerMsg::MatchUpdate {
            match_status: view.match_status(),
        }
    }
}

/// Kill feed: ring buffer of recent entries with a TTL.
pub struct FeedWidget {
    items: Vec<FeedItem>,
}

impl FeedWidget {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    fn expire(&mut self, now: u64) -> bool {
        let before = self.items.len();
        self.items
            .retain(|item| now.saturating_sub(item.timestamp) < FEED_TTL_MS);
        self.items.len() != before
    }
}

impl Widget for FeedWidget {
    fn key(&self) -> WidgetKey {
        WidgetKey::Feed
    }

    fn on_event(&mut self, event: &GameEvent, _now: u64) -> bool {
        if let GameEvent::FeedEntry(item) = event {
            self.items.push(item.clone());
            if self.items.len() > FEED_MAX_ITEMS {
                self.items.remove(0);
            }
            true
        } else {
            false
        }
    }

    fn on_tick(&mut self, view: &SimView) -> bool {
        self.expire(view.now)
    }

    fn snapshot(&self, _view: &SimView) -> ServerMsg {
        ServerMsg::FeedUpdate {
            items: self.items.clone(),
        }
    }
}

/// Current streak per player, straight from world stats.
pub struct StreaksWidget;

impl Widget for StreaksWidget {
    fn key(&self) -> WidgetKey {
        WidgetKey::Streaks
    }

    fn on_event(&mut self, event: &GameEvent, _now: u64) -> bool {
        matches!(
            event,
            GameEvent::StreakChanged { .. }
                | GameEvent::PlayerJoin { .. }
                | GameEvent::PlayerDie { .. }
                | GameEvent::PlayerLeave { .. }
        )
    }

    fn snapshot(&self, view: &SimView) -> ServerMsg {
        let streaks: std::collections::HashMap<Uuid, u32> = view
            .world
            .players
            .values()
            .map(|p| (p.id, p.stats.current_streak))
            .collect();
        ServerMsg::StreaksUpdate { streaks }
    }
}

/// Streak milestone announcements: only threshold crossings, highest newly
/// crossed category wins.
pub struct AnnouncementsWidget {
    items: Vec<Announcement>,
}

impl AnnouncementsWidget {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    fn expire(&mut self, now: u64) -> bool {
        let before = self.items.len();
        self.items
            .retain(|item| now.saturating_sub(item.timestamp) < ANNOUNCE_TTL_MS);
        self.items.len() != before
    }

    /// Highest threshold crossed by going from `previous` to `streak`.
    fn crossed_category(previous: u32, streak: u32) -> Option<(u32, &'static str)> {
        STREAK_THRESHOLDS
            .iter()
            .rev()
            .find(|(t, _)| previous < *t && *t <= streak)
            .copied()
    }
}

impl Widget for AnnouncementsWidget {
    fn key(&self) -> WidgetKey {
        WidgetKey::Announcements
    }

    fn on_event(&mut self, event: &GameEvent, now: u64) -> bool {
        let GameEvent::StreakChanged {
            player_id,
            streak,
            previous_streak,
        } = event
        else {
            return false;
        };
        let Some((_, category)) = Self::crossed_category(*previous_streak, *streak) else {
            return false;
        };
        self.items.push(Announcement {
            player_id: *player_id,
            category: category.to_string(),
            streak: *streak,
            timestamp: now,
        });
        if self.items.len() > ANNOUNCE_MAX_ITEMS {
            self.items.remove(0);
        }
        true
    }

    fn on_tick(&mut self, view: &SimView) -> bool {
        self.expire(view.now)
    }

    fn snapshot(&self, _view: &SimView) -> ServerMsg {
        ServerMsg::AnnounceUpdate {
            items: self.items.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::entities::Player;
    use crate::game::events::Weapon;
    use crate::game::world::World;
    use crate::util::vec2::Vec2;

    fn world_with(names: &[(&str, u32, u32)]) -> World {
        let cfg = GameConfig::default();
        let mut world = World::new(&cfg);
        for (name, kills, deaths) in names {
            let id = Uuid::new_v4();
            let mut p = Player::new(id, name.to_string(), Vec2::new(0.0, 0.0), &cfg, 0);
            p.stats.kills = *kills;
            p.stats.deaths = *deaths;
            world.players.insert(id, p);
        }
        world
    }

    fn view<'a>(world: &'a World, now: u64) -> SimView<'a> {
        SimView {
            world,
            match_state: None,
            now,
        }
    }

    #[test]
    fn scoreboard_sorts_kills_desc_deaths_asc_name_asc() {
        let world = world_with(&[("carol", 2, 5), ("alice", 2, 1), ("bob", 4, 0), ("dave", 2, 1)]);
        let widget = ScoreboardWidget;
        let ServerMsg::ScoreboardUpdate { rows } = widget.snapshot(&view(&world, 0)) else {
            panic!("wrong frame");
        };
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["bob", "alice", "dave", "carol"]);
    }

    #[test]
    fn feed_caps_items_and_expires() {
        let mut widget = FeedWidget::new();
        for i in 0..12u64 {
            widget.on_event(
                &GameEvent::FeedEntry(FeedItem {
                    killer: Uuid::new_v4(),
                    victim: Uuid::new_v4(),
                    weapon: Weapon::Bullet,
                    assist_ids: vec![],
                    timestamp: i,
                }),
                i,
            );
        }
        assert_eq!(widget.items.len(), FEED_MAX_ITEMS);
        // The oldest surviving entry is number 4 (0..=3 were pushed out).
        assert_eq!(widget.items[0].timestamp, 4);

        // At now = TTL + 5, entries stamped 5 and earlier have expired.
        let world = world_with(&[]);
        assert!(widget.on_tick(&view(&world, FEED_TTL_MS + 5)));
        assert_eq!(widget.items.len(), 6);
        assert_eq!(widget.items[0].timestamp, 6);
    }

    #[test]
    fn announcements_fire_on_threshold_crossings_only() {
        let mut widget = AnnouncementsWidget::new();
        let id = Uuid::new_v4();

        // 0 -> 1: below every threshold.
        assert!(!widget.on_event(
            &GameEvent::StreakChanged {
                player_id: id,
                streak: 1,
                previous_streak: 0
            },
            0,
        ));

        // 1 -> 2: double kill.
        assert!(widget.on_event(
            &GameEvent::StreakChanged {
                player_id: id,
                streak: 2,
                previous_streak: 1
            },
            0,
        ));
        assert_eq!(widget.items.last().unwrap().category, "double_kill");

        // 2 -> 3: killing spree.
        assert!(widget.on_event(
            &GameEvent::StreakChanged {
                player_id: id,
                streak: 3,
                previous_streak: 2
            },
            0,
        ));
        assert_eq!(widget.items.last().unwrap().category, "killing_spree");

        // 3 -> 4: no new threshold.
        assert!(!widget.on_event(
            &GameEvent::StreakChanged {
                player_id: id,
                streak: 4,
                previous_streak: 3
            },
            0,
        ));
    }

    #[test]
    fn announcement_jump_picks_highest_newly_crossed() {
        // 4 -> 10 crosses 5, 7, and 10; legendary wins.
        assert_eq!(
            AnnouncementsWidget::crossed_category(4, 10),
            Some((10, "legendary"))
        );
        assert_eq!(
            AnnouncementsWidget::crossed_category(5, 6),
            None
        );
    }

    #[test]
    fn announcements_expire_after_ttl() {
        let mut widget = AnnouncementsWidget::new();
        widget.on_event(
            &GameEvent::StreakChanged {
                player_id: Uuid::new_v4(),
                streak: 2,
                previous_streak: 1,
            },
            1000,
        );
        let world = world_with(&[]);
        assert!(!widget.on_tick(&view(&world, 1000 + ANNOUNCE_TTL_MS - 1)));
        assert!(widget.on_tick(&view(&world, 1000 + ANNOUNCE_TTL_MS)));
        assert!(widget.items.is_empty());
    }

    #[test]
    fn match_widget_throttles_tick_refreshes() {
        let mut widget = MatchWidget::new();
        let world = world_with(&[]);

        // First tick: status changes from unknown to idle.
        assert!(widget.on_tick(&view(&world, 1000)));
        // Same status, throttle window or not: no refresh.
        assert!(!widget.on_tick(&view(&world, 1100)));
        assert!(!widget.on_tick(&view(&world, 2000)));
        // Lifecycle events always pass.
        assert!(widget.on_event(
            &GameEvent::MatchCreated {
                match_id: Uuid::new_v4(),
                mode: "demo".into(),
                countdown_ms: 3000,
            },
            2000,
        ));
    }

    #[test]
    fn streaks_snapshot_lists_all_players() {
        let world = world_with(&[("a", 0, 0), ("b", 0, 0)]);
        let widget = StreaksWidget;
        let ServerMsg::StreaksUpdate { streaks } = widget.snapshot(&view(&world, 0)) else {
            panic!("wrong frame");
        };
        assert_eq!(streaks.len(), 2);
    }
}
