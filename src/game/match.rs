//! Match lifecycle state machine.
//!
//! At most one current match: idle → countdown → active → ended. Phase
//! transitions run through the engine's scheduled-task queue, so they can
//! never fire in the middle of another handler's work. Going active resets
//! every player's per-match stats; after the post-end grace the slot clears
//! and, when configured, a fresh demo match starts.

use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use crate::config::MatchConfig;
use crate::game::events::{EventQueue, GameEvent, MatchPhase};
use crate::game::tasks::{Task, TaskQueue};
use crate::game::world::World;

/// The single current match
#[derive(Debug, Clone)]
pub struct MatchState {
    pub id: Uuid,
    pub mode: String,
    pub phase: MatchPhase,
    pub starts_at: Option<u64>,
    pub ends_at: Option<u64>,
    /// Everyone who was present at any point during the match
    pub players: HashSet<Uuid>,
}

#[derive(Debug)]
pub struct MatchController {
    cfg: MatchConfig,
    current: Option<MatchState>,
}

impl MatchController {
    pub fn new(cfg: MatchConfig) -> Self {
        Self { cfg, current: None }
    }

    pub fn current(&self) -> Option<&MatchState> {
        self.current.as_ref()
    }

    /// Create a match and schedule its countdown completion. Replaces any
    /// current match silently; callers end the old one first.
    pub fn create_match(
        &mut self,
        world: &World,
        events: &mut EventQueue,
        tasks: &mut TaskQueue,
        now: u64,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let starts_at = now + self.cfg.countdown_ms;

        self.current = Some(MatchState {
            id,
            mode: self.cfg.mode.clone(),
            phase: MatchPhase::Countdown,
            starts_at: Some(starts_at),
            ends_at: None,
            players: world.players.keys().copied().collect(),
        });

        info!(match_id = %id, mode = %self.cfg.mode, "match created");
        events.emit(GameEvent::MatchCreated {
            match_id: id,
            mode: self.cfg.mode.clone(),
            countdown_ms: self.cfg.countdown_ms,
        });
        tasks.schedule(starts_at, Task::MatchStart(id));
        id
    }

    /// Track participation for the scoreboard and journal player sets.
    pub fn on_player_join(&mut self, id: Uuid) {
        if let Some(m) = self.current.as_mut() {
            m.players.insert(id);
        }
    }

    /// Handle a scheduled lifecycle transition. Transitions for a match that
    /// is no longer current are ignored.
    pub fn handle_task(
        &mut self,
        task: &Task,
        world: &mut World,
        events: &mut EventQueue,
        tasks: &mut TaskQueue,
        now: u64,
    ) {
        match task {
            Task::MatchStart(id) => self.start(*id, world, events, tasks, now),
            Task::MatchEnd(id) => self.end(*id, events, tasks, now),
            Task::MatchClear(id) => self.clear(*id, world, events, tasks, now),
            Task::JournalAutosave => {}
        }
    }

    fn start(
        &mut self,
        id: Uuid,
        world: &mut World,
        events: &mut EventQueue,
        tasks: &mut TaskQueue,
        now: u64,
    ) {
        let Some(m) = self.current.as_mut().filter(|m| m.id == id) else {
            return;
        };
        m.phase = MatchPhase::Active;
        m.ends_at = self.cfg.duration_ms.map(|d| now + d);

        // Everyone starts the match from zero.
        for player in world.players.values_mut() {
            player.stats.reset(now);
            events.emit(GameEvent::ScoreUpdate {
                player_id: player.id,
                kills: 0,
                deaths: 0,
                assists: 0,
            });
        }

        info!(match_id = %id, "match started");
        events.emit(GameEvent::MatchStarted {
            match_id: id,
            ends_at: m.ends_at,
        });

        if let Some(ends_at) = m.ends_at {
            tasks.schedule(ends_at, Task::MatchEnd(id));
        }
    }

    fn end(&mut self, id: Uuid, events: &mut EventQueue, tasks: &mut TaskQueue, now: u64) {
        let Some(m) = self.current.as_mut().filter(|m| m.id == id) else {
            return;
        };
        if m.phase == MatchPhase::Ended {
            return;
        }
        m.phase = MatchPhase::Ended;
        m.ends_at = Some(now);

        info!(match_id = %id, "match ended");
        events.emit(GameEvent::MatchEnded { match_id: id, at: now });
        tasks.schedule(now + self.cfg.clear_delay_ms, Task::MatchClear(id));
    }

    fn clear(
        &mut self,
        id: Uuid,
        world: &World,
        events: &mut EventQueue,
        tasks: &mut TaskQueue,
        now: u64,
    ) {
        if self.current.as_ref().is_some_and(|m| m.id == id) {
            self.current = None;
            if self.cfg.auto_restart {
                self.create_match(world, events, tasks, now);
            }
        }
    }
}
