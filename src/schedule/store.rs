//! Persisted schedule documents
//!
//! Three files under the schedule directory, each replaced atomically on
//! every flush:
//!
//! - `schedule.json` - active entries keyed by entry id
//! - `completed.json` - append-only log of published entries
//! - `failed.json` - append-only log of entries that exhausted retries
//!
//! Loading recovers from a crashed executor: entries left `in_progress` by a
//! previous invocation are demoted back to `scheduled` so they become
//! claimable again. (If the remote publish had already succeeded before the
//! crash, the CMS-side dedupe key is what prevents a visible duplicate.)

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Result;
use crate::schedule::entry::{CompletedRecord, EntryStatus, FailedRecord, ScheduleEntry};
use crate::utils::fs::{atomic_write_json, read_json};

/// Persisted schedule store: active map plus terminal logs
pub struct ScheduleStore {
    dir: PathBuf,
    active: BTreeMap<String, ScheduleEntry>,
    completed: BTreeMap<String, CompletedRecord>,
    failed: BTreeMap<String, FailedRecord>,
}

impl ScheduleStore {
    const ACTIVE_FILE: &'static str = "schedule.json";
    const COMPLETED_FILE: &'static str = "completed.json";
    const FAILED_FILE: &'static str = "failed.json";

    /// Open the store, loading all three documents and recovering entries
    /// orphaned in `in_progress` by a crashed invocation.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut active: BTreeMap<String, ScheduleEntry> =
            read_json(&dir.join(Self::ACTIVE_FILE))?.unwrap_or_default();
        let completed = read_json(&dir.join(Self::COMPLETED_FILE))?.unwrap_or_default();
        let failed = read_json(&dir.join(Self::FAILED_FILE))?.unwrap_or_default();

        let mut recovered = 0;
        for entry in active.values_mut() {
            if entry.status == EntryStatus::InProgress {
                entry.status = EntryStatus::Scheduled;
                recovered += 1;
            }
        }

        let store = Self {
            dir,
            active,
            completed,
            failed,
        };

        if recovered > 0 {
            tracing::warn!(
                recovered = recovered,
                "recovered in-progress entries from a previous crash"
            );
            store.save_active()?;
        }

        tracing::debug!(
            active = store.active.len(),
            completed = store.completed.len(),
            failed = store.failed.len(),
            "schedule store loaded"
        );
        Ok(store)
    }

    // =========================================================================
    // Active map
    // =========================================================================

    pub fn active(&self) -> &BTreeMap<String, ScheduleEntry> {
        &self.active
    }

    pub fn entry(&self, id: &str) -> Option<&ScheduleEntry> {
        self.active.get(id)
    }

    pub fn entry_mut(&mut self, id: &str) -> Option<&mut ScheduleEntry> {
        self.active.get_mut(id)
    }

    /// Insert an entry into the active map (not flushed; call
    /// [`ScheduleStore::save_active`])
    pub fn insert_entry(&mut self, entry: ScheduleEntry) {
        self.active.insert(entry.id.clone(), entry);
    }

    /// Remove an entry from the active map (not flushed)
    pub fn remove_entry(&mut self, id: &str) -> Option<ScheduleEntry> {
        self.active.remove(id)
    }

    /// Whether any active entry carries this content id
    pub fn has_active_content(&self, content_id: &str) -> bool {
        self.active
            .values()
            .any(|e| e.payload.content_id == content_id)
    }

    // =========================================================================
    // Terminal logs
    // =========================================================================

    pub fn completed(&self) -> &BTreeMap<String, CompletedRecord> {
        &self.completed
    }

    pub fn failed(&self) -> &BTreeMap<String, FailedRecord> {
        &self.failed
    }

    /// Append to the completed log (not flushed)
    pub fn record_completed(&mut self, record: CompletedRecord) {
        self.completed.insert(record.entry_id.clone(), record);
    }

    /// Append to the failed log (not flushed)
    pub fn record_failed(&mut self, record: FailedRecord) {
        self.failed.insert(record.entry_id.clone(), record);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn save_active(&self) -> Result<()> {
        atomic_write_json(&self.dir.join(Self::ACTIVE_FILE), &self.active)
    }

    pub fn save_completed(&self) -> Result<()> {
        atomic_write_json(&self.dir.join(Self::COMPLETED_FILE), &self.completed)
    }

    pub fn save_failed(&self) -> Result<()> {
        atomic_write_json(&self.dir.join(Self::FAILED_FILE), &self.failed)
    }
}
