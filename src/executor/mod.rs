//! Poll-driven execution of due schedule entries
//!
//! Designed to be invoked periodically by an external trigger (cron-like);
//! each invocation is independent and safe to re-run after a crash. One
//! execution claims the next due entry, publishes it, and settles the entry:
//!
//! - publish confirmed → completed log, then the dedup registry mark, in
//!   that order (marking an unconfirmed publish as posted would permanently
//!   hide a legitimately unpublished item)
//! - publish failed → the retry policy decides between a later slot and the
//!   failed log
//!
//! Failures local to one entry never abort a batch; only a persistence
//! failure on the registry or store propagates, because it threatens the
//! dedup invariant.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::publish::{PublishReceipt, PublishRequest, Publisher};
use crate::registry::PostRegistry;
use crate::schedule::{FailureDisposition, ScheduleManager};

/// Outcome of a single execution
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Nothing was due
    Idle,
    /// Publish confirmed and the id recorded in the registry
    Published {
        entry_id: String,
        content_id: String,
        remote_id: Option<u64>,
        remote_url: Option<String>,
        attempts: u32,
        elapsed_ms: u64,
    },
    /// Publish failed; the entry returned to the scheduled set
    Retried {
        entry_id: String,
        content_id: String,
        attempts: u32,
        next_attempt: DateTime<Utc>,
        error: String,
    },
    /// Publish failed terminally; the entry moved to the failed log
    Exhausted {
        entry_id: String,
        content_id: String,
        attempts: u32,
        error: String,
    },
    /// The content id was already in the registry; no remote call was made
    SkippedDuplicate {
        entry_id: String,
        content_id: String,
    },
}

/// Aggregated result of `execute_batch`
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub published: usize,
    pub retried: usize,
    pub exhausted: usize,
    pub skipped: usize,
    pub elapsed_ms: u64,
    pub outcomes: Vec<ExecutionOutcome>,
}

impl BatchSummary {
    fn record(&mut self, outcome: ExecutionOutcome) {
        self.attempted += 1;
        match &outcome {
            ExecutionOutcome::Published { .. } => self.published += 1,
            ExecutionOutcome::Retried { .. } => self.retried += 1,
            ExecutionOutcome::Exhausted { .. } => self.exhausted += 1,
            ExecutionOutcome::SkippedDuplicate { .. } => self.skipped += 1,
            ExecutionOutcome::Idle => {}
        }
        self.outcomes.push(outcome);
    }
}

/// Executes due schedule entries against the publish collaborator
pub struct Executor<'a, P: Publisher + ?Sized> {
    manager: &'a mut ScheduleManager,
    registry: &'a mut PostRegistry,
    publisher: &'a P,
}

impl<'a, P: Publisher + ?Sized> Executor<'a, P> {
    pub fn new(
        manager: &'a mut ScheduleManager,
        registry: &'a mut PostRegistry,
        publisher: &'a P,
    ) -> Self {
        Self {
            manager,
            registry,
            publisher,
        }
    }

    /// Execute the next due entry, if any
    pub async fn execute_next(
        &mut self,
        now: DateTime<Utc>,
        buffer: Duration,
    ) -> Result<ExecutionOutcome> {
        let Some(entry) = self.manager.get_next_due(now, buffer) else {
            tracing::debug!("no entry due");
            return Ok(ExecutionOutcome::Idle);
        };

        let started = Instant::now();
        let entry_id = entry.id.clone();
        let content_id = entry.payload.content_id.clone();

        self.manager.mark_in_progress(&entry_id, now)?;
        let attempts = entry.attempts + 1;

        // The registry is consulted again at execution time: a rescheduled
        // entry may race a copy that already published its content id.
        if self.registry.is_posted(&content_id) {
            tracing::warn!(
                entry_id = %entry_id,
                content_id = %content_id,
                "content already posted, completing without publish"
            );
            self.manager
                .mark_completed(&entry_id, PublishReceipt::skipped_duplicate(), now)?;
            return Ok(ExecutionOutcome::SkippedDuplicate {
                entry_id,
                content_id,
            });
        }

        let request = PublishRequest {
            title: entry.payload.title.clone(),
            body: entry.payload.body.clone(),
            target_time: entry.target_time,
            dedupe_key: entry.payload.dedupe_key().to_string(),
            tags: entry.payload.tags.clone(),
        };

        tracing::info!(
            entry_id = %entry_id,
            content_id = %content_id,
            title = %entry.payload.title,
            attempts = attempts,
            "executing publish"
        );

        match self.publisher.create(&request).await {
            Ok(receipt) if receipt.success => {
                let remote_id = receipt.remote_id;
                let remote_url = receipt.remote_url.clone();

                // Publish confirmed first, dedup mark second
                self.manager.mark_completed(&entry_id, receipt, now)?;
                self.registry.mark_posted(&content_id)?;

                Ok(ExecutionOutcome::Published {
                    entry_id,
                    content_id,
                    remote_id,
                    remote_url,
                    attempts,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                })
            }
            Ok(receipt) => {
                let error = receipt
                    .error
                    .unwrap_or_else(|| "publish rejected without detail".to_string());
                self.settle_failure(entry_id, content_id, error, now)
            }
            Err(e) => self.settle_failure(entry_id, content_id, e.to_string(), now),
        }
    }

    /// Convert a publish failure into a retry or a terminal failure.
    /// Publish errors stop here; only persistence errors propagate.
    fn settle_failure(
        &mut self,
        entry_id: String,
        content_id: String,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome> {
        match self.manager.mark_failed(&entry_id, &error, true, now)? {
            FailureDisposition::Retried {
                attempts,
                next_attempt,
            } => Ok(ExecutionOutcome::Retried {
                entry_id,
                content_id,
                attempts,
                next_attempt,
                error,
            }),
            FailureDisposition::Exhausted { attempts } => {
                // Surfaced in the summary, never thrown across the batch
                let terminal = Error::ExhaustedRetries {
                    entry_id: entry_id.clone(),
                    attempts,
                };
                tracing::error!(error = %terminal, cause = %error, "entry abandoned");
                Ok(ExecutionOutcome::Exhausted {
                    entry_id,
                    content_id,
                    attempts,
                    error,
                })
            }
        }
    }

    /// Execute due entries until none remain, `max_items` is reached, or
    /// `time_budget` elapses. Individual failures are aggregated, never
    /// re-raised.
    pub async fn execute_batch(
        &mut self,
        max_items: usize,
        time_budget: std::time::Duration,
        buffer: Duration,
    ) -> Result<BatchSummary> {
        let started = Instant::now();
        let mut summary = BatchSummary::default();

        while summary.attempted < max_items && started.elapsed() < time_budget {
            let outcome = self.execute_next(Utc::now(), buffer).await?;
            if matches!(outcome, ExecutionOutcome::Idle) {
                break;
            }
            summary.record(outcome);
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            attempted = summary.attempted,
            published = summary.published,
            retried = summary.retried,
            exhausted = summary.exhausted,
            skipped = summary.skipped,
            elapsed_ms = summary.elapsed_ms,
            "batch finished"
        );
        Ok(summary)
    }

    /// Re-enqueue today's recoverable failed entries
    pub fn recover_failed_posts(&mut self, now: DateTime<Utc>) -> Result<usize> {
        self.manager.reschedule_failed(now)
    }
}
