//! Slot allocation and the entry state machine
//!
//! `Scheduled → InProgress → {Completed | Scheduled(retry) | Failed}`
//!
//! Slots are aligned to a fixed interval boundary (default 15 minutes) and
//! never shared by two live entries. Each calendar day holds at most
//! `max_daily_slots` posts; overflow rolls to the next day's first boundary.
//! Retried entries are placed on the next free boundary at or after
//! `now + delay`, so both invariants survive retries.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::PublishPayload;
use crate::publish::PublishReceipt;
use crate::schedule::entry::{
    generate_entry_id, CompletedRecord, EntryStatus, FailedRecord, Priority, ScheduleEntry,
    ScheduledSlot,
};
use crate::schedule::policy::RetryPolicy;
use crate::schedule::store::ScheduleStore;

/// How far ahead slot allocation will search before giving up
const SLOT_HORIZON_DAYS: i64 = 14;

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Slot interval in minutes; must divide a day evenly
    pub slot_interval_minutes: u32,

    /// Maximum posts per calendar day
    pub max_daily_slots: usize,

    /// How early an entry becomes claimable, in minutes
    pub due_buffer_minutes: i64,

    /// Scheduled entries older than this many days are dropped by cleanup
    pub cleanup_max_age_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slot_interval_minutes: 15,
            max_daily_slots: 96,
            due_buffer_minutes: 2,
            cleanup_max_age_days: 2,
        }
    }
}

impl SchedulerConfig {
    pub fn due_buffer(&self) -> Duration {
        Duration::minutes(self.due_buffer_minutes)
    }

    pub fn cleanup_max_age(&self) -> Duration {
        Duration::days(self.cleanup_max_age_days)
    }
}

/// What `mark_failed` decided for a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Returned to the scheduled set at a later slot
    Retried {
        attempts: u32,
        next_attempt: DateTime<Utc>,
    },
    /// Moved to the failed log
    Exhausted { attempts: u32 },
}

/// Preview of an upcoming post for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingPost {
    pub entry_id: String,
    pub title: String,
    pub target_time: DateTime<Utc>,
    pub priority: Priority,
}

/// Snapshot of the schedule for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleStatus {
    pub scheduled: usize,
    pub in_progress: usize,
    pub overdue: usize,
    pub completed_today: usize,
    pub failed_today: usize,
    pub next_posts: Vec<UpcomingPost>,
    pub generated_at: DateTime<Utc>,
}

/// Allocates slots and drives entries through the state machine
pub struct ScheduleManager {
    store: ScheduleStore,
    config: SchedulerConfig,
    policy: RetryPolicy,
}

impl ScheduleManager {
    pub fn new(store: ScheduleStore, config: SchedulerConfig, policy: RetryPolicy) -> Self {
        Self {
            store,
            config,
            policy,
        }
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    // =========================================================================
    // Slot arithmetic
    // =========================================================================

    fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.config.slot_interval_minutes))
    }

    /// The first interval boundary strictly after `after`
    fn next_boundary(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let secs = i64::from(self.config.slot_interval_minutes) * 60;
        let rounded = (after.timestamp().div_euclid(secs) + 1) * secs;
        DateTime::from_timestamp(rounded, 0).unwrap_or(after)
    }

    fn next_midnight(t: DateTime<Utc>) -> DateTime<Utc> {
        let rounded = (t.timestamp().div_euclid(86_400) + 1) * 86_400;
        DateTime::from_timestamp(rounded, 0).unwrap_or(t)
    }

    fn is_slot_taken(&self, slot: DateTime<Utc>) -> bool {
        self.store
            .active()
            .values()
            .any(|e| e.target_time == slot)
    }

    /// Posts already owed per calendar day: live entries plus entries that
    /// completed for that day's slots.
    fn day_counts(&self) -> HashMap<NaiveDate, usize> {
        let mut counts: HashMap<NaiveDate, usize> = HashMap::new();
        for entry in self.store.active().values() {
            *counts.entry(entry.target_time.date_naive()).or_insert(0) += 1;
        }
        for record in self.store.completed().values() {
            *counts.entry(record.target_time.date_naive()).or_insert(0) += 1;
        }
        counts
    }

    /// Next free, capacity-respecting slot at or after `from`
    fn allocate_slot(
        &self,
        from: DateTime<Utc>,
        day_counts: &HashMap<NaiveDate, usize>,
    ) -> Option<DateTime<Utc>> {
        let horizon = from + Duration::days(SLOT_HORIZON_DAYS);
        let mut candidate = self.next_boundary(from);

        while candidate < horizon {
            let used = day_counts
                .get(&candidate.date_naive())
                .copied()
                .unwrap_or(0);
            if used >= self.config.max_daily_slots {
                candidate = Self::next_midnight(candidate);
                continue;
            }
            if self.is_slot_taken(candidate) {
                candidate = candidate + self.interval();
                continue;
            }
            return Some(candidate);
        }

        None
    }

    /// Next free slot at or after `from`, ignoring the daily cap (retries
    /// re-use capacity already accounted to their day).
    fn find_retry_slot(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let horizon = from + Duration::days(SLOT_HORIZON_DAYS);
        let mut candidate = self.next_boundary(from);

        while candidate < horizon {
            if !self.is_slot_taken(candidate) {
                return Some(candidate);
            }
            candidate = candidate + self.interval();
        }

        None
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Assign each payload to the next free interval boundary. When the
    /// current day's capacity is exhausted, allocation rolls to the next
    /// day's first boundary.
    pub fn create_slot_schedule(
        &mut self,
        items: Vec<PublishPayload>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledSlot>> {
        let mut day_counts = self.day_counts();
        let mut slots = Vec::new();
        let total = items.len();

        for payload in items {
            let Some(slot_time) = self.allocate_slot(now, &day_counts) else {
                tracing::warn!(
                    scheduled = slots.len(),
                    requested = total,
                    horizon_days = SLOT_HORIZON_DAYS,
                    "no free slot within horizon, remaining items not scheduled"
                );
                break;
            };

            let entry = ScheduleEntry::new(payload, slot_time, Priority::Normal, now);
            *day_counts.entry(slot_time.date_naive()).or_insert(0) += 1;
            slots.push(ScheduledSlot {
                entry_id: entry.id.clone(),
                target_time: slot_time,
            });

            tracing::info!(
                entry_id = %entry.id,
                content_id = %entry.payload.content_id,
                slot = %slot_time,
                "entry scheduled"
            );
            self.store.insert_entry(entry);
        }

        if !slots.is_empty() {
            self.store.save_active()?;
        }
        Ok(slots)
    }

    /// The scheduled entry that should execute next: due within
    /// `now + buffer`, selected by priority, then earliest slot, then
    /// fewest attempts.
    pub fn get_next_due(&self, now: DateTime<Utc>, buffer: Duration) -> Option<ScheduleEntry> {
        let deadline = now + buffer;
        self.store
            .active()
            .values()
            .filter(|e| e.is_due(deadline))
            .min_by_key(|e| (e.priority.rank(), e.target_time, e.attempts))
            .cloned()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// `Scheduled → InProgress`; counts the attempt.
    pub fn mark_in_progress(&mut self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let entry = self
            .store
            .entry_mut(id)
            .ok_or_else(|| Error::UnknownEntry(id.to_string()))?;

        if entry.status != EntryStatus::Scheduled {
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                detail: format!("cannot start from {}", entry.status),
            });
        }

        entry.status = EntryStatus::InProgress;
        entry.attempts += 1;
        entry.started_at = Some(now);
        let attempts = entry.attempts;

        self.store.save_active()?;
        tracing::info!(entry_id = %id, attempts = attempts, "entry in progress");
        Ok(())
    }

    /// `InProgress → Completed`: the entry moves to the completed log with
    /// the publish receipt attached.
    pub fn mark_completed(
        &mut self,
        id: &str,
        receipt: PublishReceipt,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let entry = self
            .store
            .remove_entry(id)
            .ok_or_else(|| Error::UnknownEntry(id.to_string()))?;

        if entry.status != EntryStatus::InProgress {
            let detail = format!("cannot complete from {}", entry.status);
            self.store.insert_entry(entry);
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                detail,
            });
        }

        tracing::info!(
            entry_id = %id,
            title = %entry.payload.title,
            attempts = entry.attempts,
            "publish completed"
        );

        self.store
            .record_completed(CompletedRecord::from_entry(entry, receipt, now));
        self.store.save_active()?;
        self.store.save_completed()?;
        Ok(())
    }

    /// `InProgress → Scheduled(retry)` while attempts remain, otherwise
    /// `InProgress → Failed`.
    pub fn mark_failed(
        &mut self,
        id: &str,
        error: &str,
        retry: bool,
        now: DateTime<Utc>,
    ) -> Result<FailureDisposition> {
        let (attempts, status) = {
            let entry = self
                .store
                .entry(id)
                .ok_or_else(|| Error::UnknownEntry(id.to_string()))?;
            (entry.attempts, entry.status)
        };

        if status != EntryStatus::InProgress {
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                detail: format!("cannot fail from {status}"),
            });
        }

        let retry_slot = if retry && self.policy.should_retry(attempts) {
            self.find_retry_slot(now + self.policy.delay_for(attempts))
        } else {
            None
        };

        match retry_slot {
            Some(next_attempt) => {
                let escalated = {
                    // Entry presence was checked above
                    let entry = self
                        .store
                        .entry_mut(id)
                        .ok_or_else(|| Error::UnknownEntry(id.to_string()))?;
                    entry.original_target_time =
                        entry.original_target_time.or(Some(entry.target_time));
                    entry.target_time = next_attempt;
                    entry.status = EntryStatus::Scheduled;
                    entry.priority = self.policy.escalate(entry.priority);
                    entry.last_error = Some(error.to_string());
                    entry.priority
                };
                self.store.save_active()?;

                tracing::warn!(
                    entry_id = %id,
                    attempts = attempts,
                    max_attempts = self.policy.max_attempts,
                    next_attempt = %next_attempt,
                    priority = %escalated,
                    error = %error,
                    "publish failed, retry scheduled"
                );
                Ok(FailureDisposition::Retried {
                    attempts,
                    next_attempt,
                })
            }
            None => {
                let entry = self
                    .store
                    .remove_entry(id)
                    .ok_or_else(|| Error::UnknownEntry(id.to_string()))?;

                tracing::error!(
                    entry_id = %id,
                    title = %entry.payload.title,
                    attempts = attempts,
                    error = %error,
                    "publish failed terminally"
                );

                self.store
                    .record_failed(FailedRecord::from_entry(entry, error, now));
                self.store.save_active()?;
                self.store.save_failed()?;
                Ok(FailureDisposition::Exhausted { attempts })
            }
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop scheduled entries whose slot is older than `max_age`; a safety
    /// net against entries orphaned by prior crashes.
    pub fn cleanup(&mut self, now: DateTime<Utc>, max_age: Duration) -> Result<usize> {
        let cutoff = now - max_age;
        let stale: Vec<String> = self
            .store
            .active()
            .values()
            .filter(|e| e.status == EntryStatus::Scheduled && e.target_time < cutoff)
            .map(|e| e.id.clone())
            .collect();

        for id in &stale {
            self.store.remove_entry(id);
        }

        if !stale.is_empty() {
            self.store.save_active()?;
            tracing::info!(removed = stale.len(), cutoff = %cutoff, "stale entries cleaned up");
        }
        Ok(stale.len())
    }

    /// Re-enqueue a bounded number of today's failed entries at the next
    /// free slot, attempts reset and priority raised. The failed log keeps
    /// its records; entries whose content is already active are skipped.
    pub fn reschedule_failed(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let today = now.date_naive();
        let candidates: Vec<FailedRecord> = self
            .store
            .failed()
            .values()
            .filter(|r| r.failed_at.date_naive() == today)
            .filter(|r| self.policy.reschedulable(r.final_attempts))
            .filter(|r| !self.store.has_active_content(&r.payload.content_id))
            .take(self.policy.reschedule_batch_limit)
            .cloned()
            .collect();

        let mut count = 0;
        for record in candidates {
            let Some(slot) = self.find_retry_slot(now) else {
                tracing::warn!("no free slot for failed-entry reschedule");
                break;
            };

            let mut entry = ScheduleEntry::new(record.payload, slot, Priority::High, now);
            entry.id = generate_entry_id("retry", slot);
            entry.last_error = Some(record.final_error);

            tracing::info!(
                entry_id = %entry.id,
                original = %record.entry_id,
                slot = %slot,
                "failed entry rescheduled"
            );
            self.store.insert_entry(entry);
            count += 1;
        }

        if count > 0 {
            self.store.save_active()?;
        }
        Ok(count)
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Counts by state plus a preview of the next few posts
    pub fn status(&self, now: DateTime<Utc>) -> ScheduleStatus {
        let today = now.date_naive();
        let mut scheduled = 0;
        let mut in_progress = 0;
        let mut overdue = 0;

        for entry in self.store.active().values() {
            match entry.status {
                EntryStatus::InProgress => in_progress += 1,
                EntryStatus::Scheduled if entry.target_time <= now => overdue += 1,
                EntryStatus::Scheduled => scheduled += 1,
            }
        }

        let mut upcoming: Vec<&ScheduleEntry> = self
            .store
            .active()
            .values()
            .filter(|e| e.status == EntryStatus::Scheduled && e.target_time > now)
            .collect();
        upcoming.sort_by_key(|e| e.target_time);

        let next_posts = upcoming
            .into_iter()
            .take(5)
            .map(|e| UpcomingPost {
                entry_id: e.id.clone(),
                title: e.payload.title.clone(),
                target_time: e.target_time,
                priority: e.priority,
            })
            .collect();

        ScheduleStatus {
            scheduled,
            in_progress,
            overdue,
            completed_today: self
                .store
                .completed()
                .values()
                .filter(|r| r.completed_at.date_naive() == today)
                .count(),
            failed_today: self
                .store
                .failed()
                .values()
                .filter(|r| r.failed_at.date_naive() == today)
                .count(),
            next_posts,
            generated_at: now,
        }
    }
}
