//! Durable journal storage: directory layout, gzip, streaming writes, and
//! the on-disk index.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::JournalConfig;
use crate::journal::journal::JournalEntry;
use crate::util::time::iso_for_filename;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Which directory a journal belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalScope {
    Match,
    Session,
}

impl JournalScope {
    pub fn dir_name(&self) -> &'static str {
        match self {
            JournalScope::Match => "matches",
            JournalScope::Session => "sessions",
        }
    }
}

/// Frozen journal state handed to the writer task. The entry list is the
/// snapshot taken at save time; the engine keeps appending to its own copy.
#[derive(Debug, Clone)]
pub struct JournalSnapshot {
    pub id: String,
    pub created_at: u64,
    pub match_id: Option<Uuid>,
    pub scope: JournalScope,
    pub metadata: Value,
    pub entries: Vec<JournalEntry>,
}

/// One save request for the writer task
#[derive(Debug)]
pub struct SaveJob {
    pub snapshot: JournalSnapshot,
}

/// Index record per saved journal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Uuid>,
    pub created_at: u64,
    pub duration: u64,
    pub event_count: u64,
    pub player_ids: Vec<Uuid>,
    pub file_size: u64,
    pub compressed: bool,
}

/// Owns the journal directory tree and `index.json`
pub struct JournalStorage {
    base: PathBuf,
    compress: bool,
    stream_threshold: usize,
    stream_batch_size: usize,
    index: BTreeMap<String, IndexEntry>,
}

impl JournalStorage {
    /// Open (or create) the storage layout and load the index. Keeps only
    /// the newest `keep_journals` files.
    pub fn new(cfg: &JournalConfig) -> Result<Self, JournalError> {
        fs::create_dir_all(cfg.base_dir.join(JournalScope::Match.dir_name()))?;
        fs::create_dir_all(cfg.base_dir.join(JournalScope::Session.dir_name()))?;

        let mut storage = Self {
            base: cfg.base_dir.clone(),
            compress: cfg.compress,
            stream_threshold: cfg.stream_threshold,
            stream_batch_size: cfg.stream_batch_size,
            index: BTreeMap::new(),
        };
        storage.load_index();
        storage.cleanup(None, Some(cfg.keep_journals), u64::MAX);
        Ok(storage)
    }

    fn index_path(&self) -> PathBuf {
        self.base.join("index.json")
    }

    fn load_index(&mut self) {
        match fs::read_to_string(self.index_path()) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(index) => self.index = index,
                Err(e) => warn!(error = %e, "journal index unreadable, starting fresh"),
            },
            Err(_) => debug!("no journal index yet"),
        }
    }

    fn write_index(&self) {
        let path = self.index_path();
        match serde_json::to_vec_pretty(&self.index) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&path, bytes) {
                    warn!(error = %e, path = %path.display(), "failed to write journal index");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode journal index"),
        }
    }

    pub fn index(&self) -> &BTreeMap<String, IndexEntry> {
        &self.index
    }

    fn file_name(&self, snapshot: &JournalSnapshot) -> String {
        let ext = if self.compress { ".json.gz" } else { ".json" };
        format!(
            "{}_{}{}",
            snapshot.id,
            iso_for_filename(snapshot.created_at),
            ext
        )
    }

    /// Persist one journal snapshot and refresh the index. Repeated saves of
    /// the same journal overwrite the same file.
    pub fn save(&mut self, job: SaveJob) -> Result<PathBuf, JournalError> {
        let snapshot = job.snapshot;
        let dir = self.base.join(snapshot.scope.dir_name());
        let path = dir.join(self.file_name(&snapshot));

        if snapshot.entries.len() >= self.stream_threshold {
            self.write_streaming(&path, &snapshot)?;
        } else {
            self.write_direct(&path, &snapshot)?;
        }

        let file_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let player_ids = snapshot
            .metadata
            .get("playerIds")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let duration = snapshot
            .metadata
            .get("duration")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        info!(
            journal_id = %snapshot.id,
            path = %path.display(),
            events = snapshot.entries.len(),
            "journal saved"
        );

        self.index.insert(
            snapshot.id.clone(),
            IndexEntry {
                path: path.to_string_lossy().into_owned(),
                match_id: snapshot.match_id,
                created_at: snapshot.created_at,
                duration,
                event_count: snapshot.entries.len() as u64,
                player_ids,
                file_size,
                compressed: self.compress,
            },
        );
        self.write_index();
        Ok(path)
    }

    /// Small journals: encode the whole document, then write it.
    fn write_direct(&self, path: &Path, snapshot: &JournalSnapshot) -> Result<(), JournalError> {
        let doc = serde_json::json!({
            "metadata": snapshot.metadata,
            "entries": snapshot.entries,
        });
        let bytes = serde_json::to_vec(&doc)?;
        if self.compress {
            let file = File::create(path)?;
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            encoder.write_all(&bytes)?;
            encoder.finish()?.flush()?;
        } else {
            fs::write(path, bytes)?;
        }
        Ok(())
    }

    /// Large journals: stream the document in entry batches so the full
    /// serialization never sits in memory at once.
    fn write_streaming(&self, path: &Path, snapshot: &JournalSnapshot) -> Result<(), JournalError> {
        let file = File::create(path)?;
        if self.compress {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            self.stream_document(&mut encoder, snapshot)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            self.stream_document(&mut writer, snapshot)?;
            writer.flush()?;
        }
        Ok(())
    }

    fn stream_document<W: Write>(
        &self,
        writer: &mut W,
        snapshot: &JournalSnapshot,
    ) -> Result<(), JournalError> {
        write!(writer, "{{\"metadata\":{},\"entries\":[", snapshot.metadata)?;
        let mut first = true;
        for batch in snapshot.entries.chunks(self.stream_batch_size) {
            let mut encoded = String::new();
            for entry in batch {
                if !first {
                    encoded.push(',');
                }
                first = false;
                encoded.push_str(&serde_json::to_string(entry)?);
            }
            writer.write_all(encoded.as_bytes())?;
        }
        writer.write_all(b"]}")?;
        Ok(())
    }

    /// Read a journal document back (used by tests and tooling).
    pub fn read_document(&self, path: &Path) -> Result<Value, JournalError> {
        let bytes = fs::read(path)?;
        let text = if path.extension().is_some_and(|e| e == "gz") {
            let mut decoder = flate2::read::GzDecoder::new(&bytes[..]);
            let mut out = String::new();
            decoder.read_to_string(&mut out)?;
            out
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };
        Ok(serde_json::from_str(&text)?)
    }

    /// Delete a journal file and its index entry.
    pub fn delete(&mut self, journal_id: &str) {
        if let Some(entry) = self.index.remove(journal_id) {
            if let Err(e) = fs::remove_file(&entry.path) {
                warn!(error = %e, path = %entry.path, "failed to delete journal file");
            }
            self.write_index();
        }
    }

    /// Delete journals past an age or count limit, oldest first.
    pub fn cleanup(&mut self, max_age_ms: Option<u64>, max_count: Option<usize>, now: u64) {
        let mut ids: Vec<(String, u64)> = self
            .index
            .iter()
            .map(|(id, e)| (id.clone(), e.created_at))
            .collect();
        // Newest first; the tail is what gets trimmed.
        ids.sort_by(|a, b| b.1.cmp(&a.1));

        let mut doomed: Vec<String> = Vec::new();
        if let Some(max_age) = max_age_ms {
            for (id, created_at) in &ids {
                if now.saturating_sub(*created_at) > max_age {
                    doomed.push(id.clone());
                }
            }
        }
        if let Some(max_count) = max_count {
            for (id, _) in ids.iter().skip(max_count) {
                if !doomed.contains(id) {
                    doomed.push(id.clone());
                }
            }
        }

        for id in doomed {
            info!(journal_id = %id, "cleaning up old journal");
            self.delete(&id);
        }
    }
}
