//! Schedule entry and terminal record types
//!
//! Active entries live in the schedule store's active map and only ever hold
//! the non-terminal statuses. Terminal outcomes are separate immutable record
//! kinds ([`CompletedRecord`], [`FailedRecord`]) appended to their logs when
//! an entry leaves the active map, so the state machine stays exhaustive at
//! the type level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PublishPayload;
use crate::publish::PublishReceipt;

/// Publish priority. Higher priorities win the due-selection tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
    Emergency,
}

impl Priority {
    /// Selection rank: lower wins (`Emergency > High > Normal`)
    pub fn rank(self) -> u8 {
        match self {
            Self::Emergency => 0,
            Self::High => 1,
            Self::Normal => 2,
        }
    }

    /// Escalation applied to retried entries: normal entries are raised to
    /// high; already-elevated priorities are kept.
    pub fn escalated(self) -> Self {
        match self {
            Self::Normal => Self::High,
            other => other,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::High => "high",
            Self::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

/// Non-terminal entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for its target time
    Scheduled,
    /// Claimed by an executor invocation
    InProgress,
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
        };
        write!(f, "{s}")
    }
}

/// An active schedule entry. Owned exclusively by the schedule store and
/// mutated only through the schedule manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Entry id, e.g. `post_20250101_0915_ab12cd34`
    pub id: String,

    /// Snapshot of everything the publish call needs
    pub payload: PublishPayload,

    /// Slot this entry is assigned to (interval-aligned)
    pub target_time: DateTime<Utc>,

    /// Current status
    pub status: EntryStatus,

    /// Number of executions started for this entry
    pub attempts: u32,

    /// Selection priority
    pub priority: Priority,

    /// When the entry was created
    pub created_at: DateTime<Utc>,

    /// When the most recent attempt started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Error from the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Slot originally assigned, kept when a retry moves the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_target_time: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    /// Create a new scheduled entry for a slot
    pub fn new(
        payload: PublishPayload,
        target_time: DateTime<Utc>,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_entry_id("post", target_time),
            payload,
            target_time,
            status: EntryStatus::Scheduled,
            attempts: 0,
            priority,
            created_at: now,
            started_at: None,
            last_error: None,
            original_target_time: None,
        }
    }

    /// Whether this entry is claimable at or before `deadline`
    pub fn is_due(&self, deadline: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Scheduled && self.target_time <= deadline
    }
}

/// Generate an entry id: `{prefix}_{slot}_{short-uuid}`
pub(crate) fn generate_entry_id(prefix: &str, target_time: DateTime<Utc>) -> String {
    let mut suffix = Uuid::new_v4().simple().to_string();
    suffix.truncate(8);
    format!("{prefix}_{}_{suffix}", target_time.format("%Y%m%d_%H%M"))
}

/// Immutable snapshot of a successfully published entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedRecord {
    pub entry_id: String,
    pub payload: PublishPayload,
    pub target_time: DateTime<Utc>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub final_attempts: u32,
    pub receipt: PublishReceipt,
}

impl CompletedRecord {
    pub fn from_entry(entry: ScheduleEntry, receipt: PublishReceipt, now: DateTime<Utc>) -> Self {
        Self {
            entry_id: entry.id,
            payload: entry.payload,
            target_time: entry.target_time,
            priority: entry.priority,
            created_at: entry.created_at,
            completed_at: now,
            final_attempts: entry.attempts,
            receipt,
        }
    }
}

/// Immutable snapshot of an entry that exhausted its retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRecord {
    pub entry_id: String,
    pub payload: PublishPayload,
    pub target_time: DateTime<Utc>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
    pub final_attempts: u32,
    pub final_error: String,
}

impl FailedRecord {
    pub fn from_entry(entry: ScheduleEntry, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            entry_id: entry.id,
            payload: entry.payload,
            target_time: entry.target_time,
            priority: entry.priority,
            created_at: entry.created_at,
            failed_at: now,
            final_attempts: entry.attempts,
            final_error: error.into(),
        }
    }
}

/// Slot assignment returned by `create_slot_schedule`
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledSlot {
    pub entry_id: String,
    pub target_time: DateTime<Utc>,
}
