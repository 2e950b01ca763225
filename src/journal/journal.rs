//! In-memory journal: ordered entries plus running metadata.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::events::GameEvent;

/// On-disk format version
pub const JOURNAL_VERSION: u32 = 1;

/// Ids extracted from an event for cross-journal queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victim_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assist_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Uuid>,
}

impl EventMetadata {
    pub fn is_empty(&self) -> bool {
        self.player_id.is_none()
            && self.victim_id.is_none()
            && self.assist_ids.is_empty()
            && self.source.is_none()
            && self.match_id.is_none()
    }
}

/// Extract the common id metadata for an event, if it carries any.
pub fn metadata_for(event: &GameEvent) -> Option<EventMetadata> {
    let mut meta = EventMetadata::default();
    match event {
        GameEvent::PlayerJoin { player_id, .. }
        | GameEvent::PlayerMove { player_id, .. }
        | GameEvent::PlayerAimed { player_id, .. }
        | GameEvent::PlayerDie { player_id }
        | GameEvent::PlayerLeave { player_id }
        | GameEvent::KnockbackApplied { player_id, .. }
        | GameEvent::DashStarted { player_id, .. }
        | GameEvent::DashEnded { player_id }
        | GameEvent::BuffApplied { player_id, .. }
        | GameEvent::BuffExpired { player_id, .. }
        | GameEvent::ScoreUpdate { player_id, .. }
        | GameEvent::StreakChanged { player_id, .. } => {
            meta.player_id = Some(*player_id);
        }
        GameEvent::PlayerKill {
            killer_id,
            victim_id,
            assist_ids,
        } => {
            meta.player_id = Some(*killer_id);
            meta.victim_id = Some(*victim_id);
            meta.assist_ids = assist_ids.clone();
        }
        GameEvent::FeedEntry(item) => {
            meta.player_id = Some(item.killer);
            meta.victim_id = Some(item.victim);
            meta.assist_ids = item.assist_ids.clone();
        }
        GameEvent::DamageApplied {
            target_id, source, ..
        } => {
            meta.player_id = Some(*target_id);
            meta.source = *source;
        }
        GameEvent::ExplosionSpawned { source, .. } => {
            meta.source = *source;
        }
        GameEvent::ProjectileSpawned { owner, .. } => {
            meta.player_id = Some(*owner);
        }
        GameEvent::PickupCollected { by, .. } => {
            meta.player_id = Some(*by);
        }
        GameEvent::MatchCreated { match_id, .. }
        | GameEvent::MatchStarted { match_id, .. }
        | GameEvent::MatchEnded { match_id, .. } => {
            meta.match_id = Some(*match_id);
        }
        GameEvent::ProjectileMoved { .. }
        | GameEvent::ProjectileDespawned { .. }
        | GameEvent::ProjectileBounced { .. }
        | GameEvent::PickupSpawned { .. } => {}
    }

    if meta.is_empty() {
        None
    } else {
        Some(meta)
    }
}

/// One recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    /// Sequence number within the journal
    pub id: u64,
    /// Wall-clock epoch milliseconds at record time
    pub timestamp: u64,
    /// Milliseconds since the journal started
    pub game_time: u64,
    pub event_type: String,
    pub event: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

/// The active in-memory journal
#[derive(Debug, Clone)]
pub struct EventJournal {
    pub id: String,
    pub created_at: u64,
    pub match_id: Option<Uuid>,
    pub entries: Vec<JournalEntry>,
    pub event_type_counts: BTreeMap<String, u64>,
    pub player_ids: BTreeSet<Uuid>,
    seq: u64,
}

impl EventJournal {
    pub fn new(id: String, match_id: Option<Uuid>, now: u64) -> Self {
        Self {
            id,
            created_at: now,
            match_id,
            entries: Vec::new(),
            event_type_counts: BTreeMap::new(),
            player_ids: BTreeSet::new(),
            seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Milliseconds covered by the recorded entries.
    pub fn duration(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.game_time)
    }

    /// Append an event. Counters and the unique-player set track along.
    pub fn record(&mut self, event: &GameEvent, now: u64) -> Option<&JournalEntry> {
        let value = serde_json::to_value(event).ok()?;
        let metadata = metadata_for(event);

        if let Some(meta) = &metadata {
            for id in meta
                .player_id
                .iter()
                .chain(meta.victim_id.iter())
                .chain(meta.source.iter())
                .chain(meta.assist_ids.iter())
            {
                self.player_ids.insert(*id);
            }
        }

        let kind = event.kind().to_string();
        *self.event_type_counts.entry(kind.clone()).or_insert(0) += 1;

        self.seq += 1;
        self.entries.push(JournalEntry {
            id: self.seq,
            timestamp: now,
            game_time: now.saturating_sub(self.created_at),
            event_type: kind,
            event: value,
            metadata,
        });
        self.entries.last()
    }

    /// Metadata document as persisted, with the event count frozen at the
    /// given value.
    pub fn metadata_json(&self, frozen_count: u64) -> Value {
        serde_json::json!({
            "id": self.id,
            "createdAt": self.created_at,
            "matchId": self.match_id,
            "duration": self.duration(),
            "eventCount": frozen_count,
            "playerIds": self.player_ids,
            "eventTypeCounts": self.event_type_counts,
            "version": JOURNAL_VERSION,
        })
    }

    /// Full document as persisted.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "metadata": self.metadata_json(self.entries.len() as u64),
            "entries": self.entries,
        })
    }

    /// Reconstruct a journal from its persisted document.
    pub fn from_json(value: &Value) -> Result<EventJournal, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct MetaDoc {
            id: String,
            created_at: u64,
            #[serde(default)]
            match_id: Option<Uuid>,
            #[serde(default)]
            event_type_counts: BTreeMap<String, u64>,
        }
        #[derive(Deserialize)]
        struct Doc {
            metadata: MetaDoc,
            entries: Vec<JournalEntry>,
        }

        let doc: Doc = serde_json::from_value(value.clone())?;
        let mut journal = EventJournal::new(doc.metadata.id, doc.metadata.match_id, doc.metadata.created_at);
        journal.event_type_counts = doc.metadata.event_type_counts;
        journal.seq = doc.entries.last().map_or(0, |e| e.id);
        for entry in &doc.entries {
            if let Some(meta) = &entry.metadata {
                for id in meta
                    .player_id
                    .iter()
                    .chain(meta.victim_id.iter())
                    .chain(meta.source.iter())
                    .chain(meta.assist_ids.iter())
                {
                    journal.player_ids.insert(*id);
                }
            }
        }
        journal.entries = doc.entries;
        Ok(journal)
    }
}
