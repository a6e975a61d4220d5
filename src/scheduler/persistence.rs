//! On-disk JSON cursor file, per spec.md §6: a single object keyed by
//! source name, written atomically (temp file then rename) so a crash
//! mid-write never leaves the next `load()` looking at a half-written file.
//! Corrupt or missing state is treated as empty, never invented, and always
//! logged loudly — a cursor is allowed to be absent, never wrong.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCursor {
    pub last_event_time: Option<DateTime<Utc>>,
    pub last_processed_id: Option<String>,
    pub last_run_time: Option<DateTime<Utc>>,
}

pub type SchedulerState = HashMap<String, SourceCursor>;

pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A missing file is a fresh instance's empty state. A file that exists
    /// but fails to parse is corruption, not absence — logged at `error`
    /// and still treated as empty rather than aborting startup.
    pub fn load(&self) -> SchedulerState {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SchedulerState::default(),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to read scheduler state file, starting from empty cursors");
                return SchedulerState::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "scheduler state file is corrupt, starting from empty cursors");
                SchedulerState::default()
            }
        }
    }

    pub fn save(&self, state: &SchedulerState) -> anyhow::Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
