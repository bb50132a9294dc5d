//! Durable registry of already-published content ids
//!
//! The dedup gate everything else depends on. Membership is checked before a
//! schedule entry is created and again before a publish call is trusted to
//! have succeeded uniquely. The set is monotonic: ids are never removed
//! except by the explicit administrative [`PostRegistry::reset`].
//!
//! Persistence is stricter here than anywhere else in the engine: every
//! `mark_posted` writes a temp file, atomically renames it over the registry
//! file, then reads the file back and verifies it matches the in-memory set
//! before the call returns. A verification failure rolls back the in-memory
//! addition and surfaces as [`Error::Persistence`]: a silently lost mark is
//! the one failure mode that causes duplicate publishing.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::fs::atomic_write_json;

/// On-disk document shape: a sorted list of posted ids
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    posted_ids: Vec<String>,
}

/// Durable set of content ids that have been published
pub struct PostRegistry {
    path: PathBuf,
    posted: HashSet<String>,
}

impl PostRegistry {
    /// Open the registry, loading the persisted set if present.
    ///
    /// A corrupt registry file is a hard error: falling back to an empty set
    /// would quietly re-open the gate for every id already published.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let posted = match crate::utils::fs::read_json::<RegistryDocument>(&path)? {
            Some(doc) => doc.posted_ids.into_iter().collect(),
            None => HashSet::new(),
        };

        tracing::debug!(path = %path.display(), count = posted.len(), "post registry loaded");
        Ok(Self { path, posted })
    }

    /// Check whether a content id has already been published
    pub fn is_posted(&self, id: &str) -> bool {
        self.posted.contains(id)
    }

    /// Number of ids in the registry
    pub fn posted_count(&self) -> usize {
        self.posted.len()
    }

    /// Record a content id as durably published.
    ///
    /// Idempotent: marking an id that is already present is a no-op and does
    /// not touch the disk. Otherwise the id is added, persisted, and the
    /// written file is read back and verified; on any failure the addition is
    /// rolled back and the error is returned.
    pub fn mark_posted(&mut self, id: &str) -> Result<()> {
        if self.posted.contains(id) {
            tracing::debug!(content_id = %id, "already marked as posted");
            return Ok(());
        }

        self.posted.insert(id.to_string());

        if let Err(e) = self.persist_and_verify() {
            self.posted.remove(id);
            tracing::error!(content_id = %id, error = %e, "failed to persist posted mark, rolled back");
            return Err(e);
        }

        tracing::info!(content_id = %id, total = self.posted.len(), "marked as posted");
        Ok(())
    }

    /// Return the subset of `ids` not present in the registry, preserving
    /// the input order
    pub fn filter_unposted(&self, ids: &[String]) -> Vec<String> {
        let unposted: Vec<String> = ids
            .iter()
            .filter(|id| !self.posted.contains(id.as_str()))
            .cloned()
            .collect();

        tracing::debug!(
            total = ids.len(),
            unposted = unposted.len(),
            "filtered candidates against registry"
        );
        unposted
    }

    /// Administrative reset: clear the registry (destructive).
    pub fn reset(&mut self) -> Result<()> {
        let previous = std::mem::take(&mut self.posted);

        if let Err(e) = self.persist_and_verify() {
            self.posted = previous;
            return Err(e);
        }

        tracing::warn!(cleared = previous.len(), "post registry reset");
        Ok(())
    }

    /// Write the set to disk atomically, then read it back and verify it
    /// matches memory.
    fn persist_and_verify(&self) -> Result<()> {
        let mut posted_ids: Vec<String> = self.posted.iter().cloned().collect();
        posted_ids.sort();

        atomic_write_json(&self.path, &RegistryDocument { posted_ids })?;

        let written = Self::read_back(&self.path)?;
        if written != self.posted {
            return Err(Error::persistence(
                &self.path,
                format!(
                    "read-back verification mismatch: {} ids on disk, {} in memory",
                    written.len(),
                    self.posted.len()
                ),
            ));
        }

        Ok(())
    }

    fn read_back(path: &Path) -> Result<HashSet<String>> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::persistence(path, format!("read-back: {e}")))?;
        let doc: RegistryDocument = serde_json::from_str(&content)
            .map_err(|e| Error::persistence(path, format!("read-back parse: {e}")))?;
        Ok(doc.posted_ids.into_iter().collect())
    }
}
