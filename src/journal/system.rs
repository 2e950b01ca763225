//! Journal recording policy: what gets recorded where, and when journals
//! rotate and save.
//!
//! The system runs on the engine task; saves are frozen snapshots shipped
//! over a channel to the writer task spawned by [`spawn_journal_writer`].
//! A failed or dropped save leaves the in-memory journal intact for the
//! next auto-save.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::JournalConfig;
use crate::game::events::GameEvent;
use crate::journal::journal::EventJournal;
use crate::journal::storage::{JournalScope, JournalSnapshot, JournalStorage, SaveJob};
use crate::util::time::iso_for_filename;

/// Capacity of the save-job channel; the engine never blocks on it
const SAVE_QUEUE_CAPACITY: usize = 16;

pub struct JournalSystem {
    cfg: JournalConfig,
    current: Option<EventJournal>,
    scope: JournalScope,
    unsaved: usize,
    save_tx: Option<mpsc::Sender<SaveJob>>,
}

impl JournalSystem {
    pub fn new(cfg: JournalConfig, save_tx: Option<mpsc::Sender<SaveJob>>, now: u64) -> Self {
        let mut system = Self {
            cfg,
            current: None,
            scope: JournalScope::Session,
            unsaved: 0,
            save_tx,
        };
        if !system.cfg.disabled {
            system.start_session_journal(now);
        }
        system
    }

    pub fn disabled(&self) -> bool {
        self.cfg.disabled
    }

    pub fn current(&self) -> Option<&EventJournal> {
        self.current.as_ref()
    }

    pub fn unsaved(&self) -> usize {
        self.unsaved
    }

    /// Observe one dispatched event. Match boundaries rotate the journal:
    /// `match:created` opens a match-scoped journal that records the event
    /// itself; `match:ended` is recorded first, then a session-scoped
    /// journal bridges the gap to the next match.
    pub fn observe(&mut self, event: &GameEvent, now: u64) {
        if self.cfg.disabled {
            return;
        }

        match event {
            GameEvent::MatchCreated { match_id, .. } => {
                self.save_current();
                self.start_match_journal(*match_id, now);
                self.record(event, now);
            }
            GameEvent::MatchEnded { .. } => {
                self.record(event, now);
                self.save_current();
                self.start_session_journal(now);
            }
            _ => self.record(event, now),
        }
    }

    fn record(&mut self, event: &GameEvent, now: u64) {
        // Rotate within the same scope when the journal hits its hard cap.
        if self
            .current
            .as_ref()
            .is_some_and(|j| j.len() as u64 >= self.cfg.max_journal_size)
        {
            info!("journal reached max size, rotating");
            self.save_current();
            match self.scope {
                JournalScope::Match => {
                    let match_id = self.current.as_ref().and_then(|j| j.match_id);
                    if let Some(match_id) = match_id {
                        self.start_match_journal(match_id, now);
                    } else {
                        self.start_session_journal(now);
                    }
                }
                JournalScope::Session => self.start_session_journal(now),
            }
        }

        let Some(journal) = self.current.as_mut() else {
            return;
        };
        if journal.record(event, now).is_some() {
            self.unsaved += 1;
            if self.cfg.debug {
                debug!(kind = event.kind(), entries = journal.len(), "journal record");
            }
        }

        // Advisory flush once the buffer point is passed.
        if self.unsaved >= self.cfg.max_buffer_size {
            self.request_save();
        }
    }

    fn start_match_journal(&mut self, match_id: Uuid, now: u64) {
        let id = format!("match_{}_{}", match_id, iso_for_filename(now));
        self.current = Some(EventJournal::new(id, Some(match_id), now));
        self.scope = JournalScope::Match;
        self.unsaved = 0;
    }

    fn start_session_journal(&mut self, now: u64) {
        let suffix = &Uuid::new_v4().to_string()[..8];
        let id = format!("session_{}_{}", iso_for_filename(now), suffix);
        self.current = Some(EventJournal::new(id, None, now));
        self.scope = JournalScope::Session;
        self.unsaved = 0;
    }

    fn snapshot(&self) -> Option<JournalSnapshot> {
        let journal = self.current.as_ref()?;
        if journal.is_empty() {
            return None;
        }
        Some(JournalSnapshot {
            id: journal.id.clone(),
            created_at: journal.created_at,
            match_id: journal.match_id,
            scope: self.scope,
            metadata: journal.metadata_json(journal.len() as u64),
            entries: journal.entries.clone(),
        })
    }

    fn request_save(&mut self) {
        let Some(snapshot) = self.snapshot() else {
            return;
        };
        let Some(tx) = &self.save_tx else {
            return;
        };
        match tx.try_send(SaveJob { snapshot }) {
            Ok(()) => self.unsaved = 0,
            Err(e) => {
                // Writer is behind; entries stay unsaved for the next pass.
                warn!(error = %e, "journal save queue full, deferring save");
            }
        }
    }

    /// Save the current journal without rotating (auto-save timer).
    pub fn autosave(&mut self, _now: u64) {
        if self.cfg.disabled || self.unsaved == 0 {
            return;
        }
        self.request_save();
    }

    fn save_current(&mut self) {
        if self.current.as_ref().is_some_and(|j| !j.is_empty()) {
            self.request_save();
        }
    }

    /// Final save on graceful shutdown.
    pub fn shutdown(&mut self) {
        if self.cfg.disabled {
            return;
        }
        self.save_current();
    }
}

/// Spawn the writer task that owns [`JournalStorage`] and performs the
/// blocking file work off the simulation loop.
pub fn spawn_journal_writer(
    storage: JournalStorage,
) -> (mpsc::Sender<SaveJob>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<SaveJob>(SAVE_QUEUE_CAPACITY);
    let storage = Arc::new(Mutex::new(storage));

    let handle = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let storage = storage.clone();
            let result = tokio::task::spawn_blocking(move || {
                let mut storage = match storage.lock() {
                    Ok(s) => s,
                    Err(poisoned) => poisoned.into_inner(),
                };
                storage.save(job)
            })
            .await;

            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "journal save failed"),
                Err(e) => warn!(error = %e, "journal writer task panicked"),
            }
        }
        info!("journal writer drained, shutting down");
    });

    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> JournalConfig {
        JournalConfig::default()
    }

    fn channel() -> (mpsc::Sender<SaveJob>, mpsc::Receiver<SaveJob>) {
        mpsc::channel(SAVE_QUEUE_CAPACITY)
    }

    fn die_event() -> GameEvent {
        GameEvent::PlayerDie {
            player_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn records_into_a_session_journal_by_default() {
        let (tx, _rx) = channel();
        let mut system = JournalSystem::new(cfg(), Some(tx), 1000);

        system.observe(&die_event(), 1100);
        let journal = system.current().unwrap();
        assert!(journal.id.starts_with("session_"));
        assert_eq!(journal.len(), 1);
        assert_eq!(system.unsaved(), 1);
    }

    #[test]
    fn disabled_journal_records_nothing() {
        let mut c = cfg();
        c.disabled = true;
        let mut system = JournalSystem::new(c, None, 1000);
        system.observe(&die_event(), 1100);
        assert!(system.current().is_none());
    }

    #[test]
    fn match_created_rotates_and_records_into_new_journal() {
        let (tx, mut rx) = channel();
        let mut system = JournalSystem::new(cfg(), Some(tx), 1000);
        system.observe(&die_event(), 1100);

        let match_id = Uuid::new_v4();
        system.observe(
            &GameEvent::MatchCreated {
                match_id,
                mode: "demo".into(),
                countdown_ms: 3000,
            },
            2000,
        );

        // The prior session journal went out as a save job.
        let job = rx.try_recv().unwrap();
        assert!(job.snapshot.id.starts_with("session_"));
        assert_eq!(job.snapshot.entries.len(), 1);

        // The new match journal holds the creation event itself.
        let journal = system.current().unwrap();
        assert!(journal.id.starts_with(&format!("match_{match_id}")));
        assert_eq!(journal.match_id, Some(match_id));
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.entries[0].event_type, "match:created");
    }

    #[test]
    fn match_ended_is_recorded_then_rotated_out() {
        let (tx, mut rx) = channel();
        let mut system = JournalSystem::new(cfg(), Some(tx), 1000);

        let match_id = Uuid::new_v4();
        system.observe(
            &GameEvent::MatchCreated {
                match_id,
                mode: "demo".into(),
                countdown_ms: 3000,
            },
            2000,
        );
        system.observe(&GameEvent::MatchEnded { match_id, at: 9000 }, 9000);

        let job = rx.try_recv().unwrap();
        assert!(job.snapshot.id.starts_with("match_"));
        let kinds: Vec<&str> = job
            .snapshot
            .entries
            .iter()
            .map(|e| e.event_type.as_str())
            .collect();
        assert_eq!(kinds, vec!["match:created", "match:ended"]);

        // Back on a session journal for the inter-match gap.
        assert!(system.current().unwrap().id.starts_with("session_"));
        assert!(system.current().unwrap().is_empty());
    }

    #[test]
    fn size_cap_rotates_within_scope() {
        let mut c = cfg();
        c.max_journal_size = 5;
        c.max_buffer_size = 1000;
        let (tx, mut rx) = channel();
        let mut system = JournalSystem::new(c, Some(tx), 0);

        for i in 0..6 {
            system.observe(&die_event(), i);
        }

        let job = rx.try_recv().unwrap();
        assert_eq!(job.snapshot.entries.len(), 5);
        assert_eq!(system.current().unwrap().len(), 1);
    }

    #[test]
    fn autosave_only_fires_with_unsaved_entries() {
        let (tx, mut rx) = channel();
        let mut system = JournalSystem::new(cfg(), Some(tx), 0);

        system.autosave(1000);
        assert!(rx.try_recv().is_err());

        system.observe(&die_event(), 500);
        system.autosave(1000);
        let job = rx.try_recv().unwrap();
        assert_eq!(job.snapshot.entries.len(), 1);
        assert_eq!(system.unsaved(), 0);

        // Nothing new since the save: the next autosave is a no-op.
        system.autosave(2000);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn buffer_point_requests_an_advisory_save() {
        let mut c = cfg();
        c.max_buffer_size = 3;
        let (tx, mut rx) = channel();
        let mut system = JournalSystem::new(c, Some(tx), 0);

        system.observe(&die_event(), 1);
        system.observe(&die_event(), 2);
        assert!(rx.try_recv().is_err());
        system.observe(&die_event(), 3);
        let job = rx.try_recv().unwrap();
        assert_eq!(job.snapshot.entries.len(), 3);
    }

    #[test]
    fn shutdown_saves_whatever_is_left() {
        let (tx, mut rx) = channel();
        let mut system = JournalSystem::new(cfg(), Some(tx), 0);
        system.observe(&die_event(), 1);
        system.shutdown();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn frozen_event_count_matches_snapshot_entries() {
        let (tx, mut rx) = channel();
        let mut system = JournalSystem::new(cfg(), Some(tx), 0);
        system.observe(&die_event(), 1);
        system.observe(&die_event(), 2);
        system.autosave(100);

        let job = rx.try_recv().unwrap();
        assert_eq!(job.snapshot.metadata["eventCount"], 2);
    }
}
