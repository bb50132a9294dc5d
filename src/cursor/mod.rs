//! Persisted pagination position for the discovery collaborator
//!
//! Repeated runs continue scanning the catalog forward instead of re-reading
//! from the start. The advance policy is deliberately asymmetric
//! ("new-item-priority"): a window that still yields enough unposted
//! candidates is NOT advanced past, trading scan throughput for minimal
//! latency between discovery and publish of the newest items.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::fs::{atomic_write_json, read_json};

/// Persisted cursor state. Single record, overwritten each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetState {
    /// Offset the next discovery fetch should start from
    pub position: u64,

    /// Window size used on the run that produced this state
    pub batch_size: u64,

    /// Unposted candidates found on that run
    pub last_found_count: u64,

    /// When the state was written
    pub updated_at: DateTime<Utc>,
}

/// Discovery pagination cursor backed by a single JSON file
pub struct OffsetCursor {
    path: PathBuf,
}

impl OffsetCursor {
    /// First catalog offset; also the reset target
    pub const INITIAL_OFFSET: u64 = 1;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Offset the next discovery fetch should start from.
    ///
    /// Defaults to 1 when no state has been persisted. An unreadable state
    /// file also falls back to 1: re-scanning from the start is safe because
    /// the registry filters everything already published.
    pub fn next_offset(&self) -> u64 {
        match read_json::<OffsetState>(&self.path) {
            Ok(Some(state)) => state.position,
            Ok(None) => Self::INITIAL_OFFSET,
            Err(e) => {
                tracing::warn!(error = %e, "offset state unreadable, restarting from 1");
                Self::INITIAL_OFFSET
            }
        }
    }

    /// Record the outcome of a discovery run and compute the next position.
    ///
    /// - `found_count == 0`: the window was exhausted; move past it.
    /// - `found_count >= required_count`: the window may still hold
    ///   unharvested candidates; keep the position so the next run re-reads
    ///   it (stats are still updated).
    /// - otherwise: the window's unposted yield was taken in full; move past
    ///   it.
    pub fn advance(
        &self,
        current_offset: u64,
        batch_size: u64,
        found_count: u64,
        required_count: u64,
        now: DateTime<Utc>,
    ) -> Result<OffsetState> {
        let position = if found_count == 0 || found_count < required_count {
            current_offset + batch_size
        } else {
            current_offset
        };

        let state = OffsetState {
            position,
            batch_size,
            last_found_count: found_count,
            updated_at: now,
        };
        atomic_write_json(&self.path, &state)?;

        if position == current_offset {
            tracing::info!(
                offset = current_offset,
                found = found_count,
                "window still yielding, offset held"
            );
        } else {
            tracing::info!(
                from = current_offset,
                to = position,
                found = found_count,
                "offset advanced"
            );
        }

        Ok(state)
    }

    /// Administrative reset back to the first offset
    pub fn reset(&self, now: DateTime<Utc>) -> Result<()> {
        let state = OffsetState {
            position: Self::INITIAL_OFFSET,
            batch_size: 0,
            last_found_count: 0,
            updated_at: now,
        };
        atomic_write_json(&self.path, &state)?;

        tracing::warn!("search offset reset to 1");
        Ok(())
    }

    /// Current persisted state, if any (ops reporting)
    pub fn status(&self) -> Option<OffsetState> {
        read_json(&self.path).ok().flatten()
    }
}
