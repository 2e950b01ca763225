//! HUD projection layer.
//!
//! Five server-side widgets project world state into per-widget snapshots
//! pushed only to subscribed connections. A single dispatcher watches the
//! event stream, collects dirty widgets, and flushes snapshots on a short
//! delay (immediately for kill-feed and streak changes).

pub mod widgets;

use std::collections::HashSet;

use crate::game::events::GameEvent;
use crate::game::r#match::MatchState;
use crate::game::world::World;
use crate::ws::protocol::{MatchStatus, ServerMsg, WidgetKey};
use crate::ws::registry::ConnectionRegistry;

use widgets::{
    AnnouncementsWidget, FeedWidget, MatchWidget, ScoreboardWidget, StreaksWidget, Widget,
};

/// Delay between a widget turning dirty and its snapshot going out
const FLUSH_DELAY_MS: u64 = 30;

/// Read-only view of the simulation for building snapshots
pub struct SimView<'a> {
    pub world: &'a World,
    pub match_state: Option<&'a MatchState>,
    pub now: u64,
}

impl SimView<'_> {
    /// Match description for the match widget and session frames.
    pub fn match_status(&self) -> MatchStatus {
        match self.match_state {
            Some(m) => MatchStatus {
                id: Some(m.id),
                mode: Some(m.mode.clone()),
                phase: m.phase,
                starts_at: m.starts_at,
                ends_at: m.ends_at,
            },
            None => MatchStatus::idle(),
        }
    }
}

pub struct HudDispatcher {
    widgets: Vec<Box<dyn Widget + Send>>,
    dirty: HashSet<WidgetKey>,
    flush_at: Option<u64>,
}

impl HudDispatcher {
    pub fn new() -> Self {
        Self {
            widgets: vec![
                Box::new(ScoreboardWidget),
                Box::new(MatchWidget::new()),
                Box::new(FeedWidget::new()),
                Box::new(StreaksWidget),
                Box::new(AnnouncementsWidget::new()),
            ],
            dirty: HashSet::new(),
            flush_at: None,
        }
    }

    /// Offer an event to every widget; dirty widgets get a flush scheduled.
    pub fn on_event(&mut self, event: &GameEvent, now: u64) {
        let urgent = matches!(
            event,
            GameEvent::FeedEntry(_) | GameEvent::StreakChanged { .. }
        );
        let mut any = false;
        for widget in &mut self.widgets {
            if widget.on_event(event, now) {
                self.dirty.insert(widget.key());
                any = true;
            }
        }
        if any {
            let at = if urgent { now } else { now + FLUSH_DELAY_MS };
            self.schedule(at);
        }
    }

    /// Tick-driven refresh: TTL expiry and throttled match updates.
    pub fn on_tick(&mut self, view: &SimView) {
        let mut any = false;
        for widget in &mut self.widgets {
            if widget.on_tick(view) {
                self.dirty.insert(widget.key());
                any = true;
            }
        }
        if any {
            self.schedule(view.now + FLUSH_DELAY_MS);
        }
    }

    fn schedule(&mut self, at: u64) {
        self.flush_at = Some(self.flush_at.map_or(at, |cur| cur.min(at)));
    }

    /// Send every dirty widget's snapshot to its subscribers once the flush
    /// deadline has passed.
    pub fn flush_due(&mut self, view: &SimView, registry: &ConnectionRegistry) {
        if !self.flush_at.is_some_and(|at| at <= view.now) {
            return;
        }
        self.flush_at = None;

        for widget in &self.widgets {
            let key = widget.key();
            if !self.dirty.contains(&key) {
                continue;
            }
            if registry.has_hud_subscriber(key) {
                let msg = widget.snapshot(view);
                registry.send_hud(key, &msg);
            }
        }
        self.dirty.clear();
    }

    /// Build one widget's snapshot immediately (initial subscribe).
    pub fn snapshot_for(&self, key: WidgetKey, view: &SimView) -> Option<ServerMsg> {
        self.widgets
            .iter()
            .find(|w| w.key() == key)
            .map(|w| w.snapshot(view))
    }
}

impl Default for HudDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
