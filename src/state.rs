//! Durable, resumable export progress.
//!
//! The state file is a versioned JSON document written with temp-then-rename, so an
//! interrupted save leaves the previous state in place. Unreadable, malformed or
//! version-skewed files are logged and treated as absent; they never abort a run.

use crate::model::RecordKey;
use crate::util::write_file_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const STATE_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub version: u32,
    pub processed_keys: BTreeSet<RecordKey>,
    /// Comment ids already submitted (API mode resumes inside a record).
    #[serde(default)]
    pub processed_comments: BTreeSet<u64>,
    pub last_completed_batch_index: Option<u32>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            processed_keys: BTreeSet::new(),
            processed_comments: BTreeSet::new(),
            last_completed_batch_index: None,
        }
    }
}

impl ProgressState {
    pub fn is_processed(&self, key: &RecordKey) -> bool {
        self.processed_keys.contains(key)
    }

    /// Index the next batch should use: one past the last completed batch.
    /// `None` once the numbering is exhausted.
    pub fn next_batch_index(&self) -> Option<u32> {
        match self.last_completed_batch_index {
            None => Some(0),
            Some(i) => i.checked_add(1),
        }
    }
}

/// Where the state lives. One writer at a time; there is no locking.
#[derive(Clone, Debug)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when there is no usable prior state.
    pub fn load(&self) -> Option<ProgressState> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path=%self.path.display(), "no prior export state");
                return None;
            }
            Err(e) => {
                tracing::warn!(path=%self.path.display(), error=%e, "export state unreadable; starting fresh");
                return None;
            }
        };

        #[derive(Deserialize)]
        struct VersionField {
            version: Option<u32>,
        }
        match serde_json::from_slice::<VersionField>(&bytes) {
            Ok(VersionField { version: Some(STATE_VERSION) }) => {}
            Ok(VersionField { version }) => {
                tracing::warn!(
                    path=%self.path.display(),
                    found=?version,
                    expected=STATE_VERSION,
                    "export state has an unsupported version; starting fresh"
                );
                return None;
            }
            Err(e) => {
                tracing::warn!(path=%self.path.display(), error=%e, "export state is corrupt; starting fresh");
                return None;
            }
        }

        match serde_json::from_slice::<ProgressState>(&bytes) {
            Ok(state) if state.next_batch_index().is_none() => {
                tracing::warn!(path=%self.path.display(), "export state has no batch index left; starting fresh");
                None
            }
            Ok(state) => {
                tracing::info!(
                    path=%self.path.display(),
                    processed=state.processed_keys.len(),
                    last_batch=?state.last_completed_batch_index,
                    "resuming from saved export state"
                );
                Some(state)
            }
            Err(e) => {
                tracing::warn!(path=%self.path.display(), error=%e, "export state is malformed; starting fresh");
                None
            }
        }
    }

    pub fn load_or_default(&self) -> ProgressState {
        self.load().unwrap_or_default()
    }

    pub fn save(&self, state: &ProgressState) -> Result<()> {
        let bytes = serde_json::to_vec(state).context("serialize export state")?;
        write_file_atomic(&self.path, &bytes)
            .with_context(|| format!("save export state {}", self.path.display()))
    }
}

/// How often the tracker flushes state to disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveGranularity {
    /// After every completed batch (accepted API comments are still flushed one by one).
    PerBatch,
    /// After every completed record and every batch.
    PerItem,
}

/// In-memory progress plus its (optional) durable home.
/// Without a store nothing is persisted, which is what dry runs use.
pub struct ProgressTracker {
    state: ProgressState,
    store: Option<ProgressStore>,
    granularity: SaveGranularity,
    saves: u64,
}

impl ProgressTracker {
    pub fn new(state: ProgressState, store: Option<ProgressStore>, granularity: SaveGranularity) -> Self {
        Self { state, store, granularity, saves: 0 }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn into_state(self) -> ProgressState {
        self.state
    }

    pub fn granularity(&self) -> SaveGranularity {
        self.granularity
    }

    /// Number of state writes so far.
    pub fn saves(&self) -> u64 {
        self.saves
    }

    pub fn is_processed(&self, key: &RecordKey) -> bool {
        self.state.is_processed(key)
    }

    pub fn is_comment_processed(&self, id: u64) -> bool {
        self.state.processed_comments.contains(&id)
    }

    /// Call only once the record's output is committed.
    pub fn mark_record(&mut self, key: &RecordKey) -> Result<()> {
        let added = self.state.processed_keys.insert(key.clone());
        if added && self.granularity == SaveGranularity::PerItem {
            self.persist()?;
        }
        Ok(())
    }

    /// Call only once the comment was accepted by the destination. Always flushes,
    /// whatever the granularity: a remote post cannot be taken back, so its id must
    /// be on disk before the next one is sent.
    pub fn mark_comment_durable(&mut self, id: u64) -> Result<()> {
        if self.state.processed_comments.insert(id) {
            self.persist()?;
        }
        Ok(())
    }

    /// Record batch `index` as complete and flush.
    pub fn commit_batch(&mut self, index: u32) -> Result<()> {
        let last = self.state.last_completed_batch_index.map_or(index, |prev| prev.max(index));
        self.state.last_completed_batch_index = Some(last);
        self.persist()
    }

    fn persist(&mut self) -> Result<()> {
        if let Some(store) = &self.store {
            store.save(&self.state)?;
            self.saves += 1;
        }
        Ok(())
    }
}
