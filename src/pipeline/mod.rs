//! Intake pipeline: discover, deduplicate, rewrite, schedule
//!
//! One harvest run reads the cursor, fetches a single discovery window,
//! filters it through the post registry, takes up to `required_count`
//! candidates, and hands them to the schedule manager. The cursor is then
//! advanced per the new-item-priority policy.
//!
//! Rewritten bodies are cached per content id so a re-scanned window (the
//! policy keeps yielding windows in place) does not re-pay the rewrite call.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::Cache;
use crate::cursor::OffsetCursor;
use crate::discovery::{Discovery, DiscoveryConfig};
use crate::error::Result;
use crate::models::{CandidateItem, PublishPayload};
use crate::registry::PostRegistry;
use crate::rewrite::Rewriter;
use crate::schedule::{ScheduleManager, ScheduledSlot};

/// Cache namespace for rewritten bodies
const REWRITE_NAMESPACE: &str = "rewrite";

/// Result of one harvest run
#[derive(Debug, Serialize)]
pub struct HarvestReport {
    /// Offset the window was fetched at
    pub offset: u64,
    /// Items the catalog returned
    pub fetched: usize,
    /// Unposted, not-yet-scheduled candidates in the window
    pub found: usize,
    /// Entries created this run
    pub scheduled: Vec<ScheduledSlot>,
    /// Offset the next run will start from
    pub next_offset: u64,
    pub generated_at: DateTime<Utc>,
}

/// Orchestrates one discovery-to-schedule cycle
pub struct IntakePipeline<'a, D: Discovery + ?Sized, R: Rewriter + ?Sized> {
    discovery: &'a D,
    rewriter: &'a R,
    registry: &'a PostRegistry,
    manager: &'a mut ScheduleManager,
    cursor: &'a OffsetCursor,
    cache: &'a Cache,
    config: &'a DiscoveryConfig,
}

impl<'a, D: Discovery + ?Sized, R: Rewriter + ?Sized> IntakePipeline<'a, D, R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        discovery: &'a D,
        rewriter: &'a R,
        registry: &'a PostRegistry,
        manager: &'a mut ScheduleManager,
        cursor: &'a OffsetCursor,
        cache: &'a Cache,
        config: &'a DiscoveryConfig,
    ) -> Self {
        Self {
            discovery,
            rewriter,
            registry,
            manager,
            cursor,
            cache,
            config,
        }
    }

    /// Run one harvest cycle, wanting `required_count` new candidates
    pub async fn run(&mut self, required_count: u64, now: DateTime<Utc>) -> Result<HarvestReport> {
        let offset = self.cursor.next_offset();
        let items = self.discovery.fetch(offset, self.config.batch_size).await?;
        let fetched = items.len();

        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        let unposted = self.registry.filter_unposted(&ids);

        // Unposted and not already carried by a live entry
        let mut selected: Vec<CandidateItem> = items
            .into_iter()
            .filter(|item| unposted.contains(&item.id))
            .filter(|item| !self.manager.store().has_active_content(&item.id))
            .collect();
        let found = selected.len() as u64;
        selected.truncate(required_count as usize);

        tracing::info!(
            offset = offset,
            fetched = fetched,
            found = found,
            taking = selected.len(),
            "harvest window evaluated"
        );

        let mut payloads = Vec::with_capacity(selected.len());
        for item in selected {
            let body = self.publish_body(&item, now).await;
            payloads.push(PublishPayload {
                content_id: item.id,
                title: item.title,
                body,
                tags: item.tags,
                source_url: item.source_url,
            });
        }

        let scheduled = self.manager.create_slot_schedule(payloads, now)?;
        let state = self.cursor.advance(
            offset,
            self.config.batch_size,
            found,
            required_count,
            now,
        )?;

        Ok(HarvestReport {
            offset,
            fetched,
            found: found as usize,
            scheduled,
            next_offset: state.position,
            generated_at: now,
        })
    }

    /// Rewritten body for a candidate, served from the cache when the same
    /// window was harvested recently. Rewrite failures fall back to the raw
    /// text and are not cached, so a later run can try again.
    async fn publish_body(&self, item: &CandidateItem, now: DateTime<Utc>) -> String {
        if let Some(cached) = self
            .cache
            .get::<String>(REWRITE_NAMESPACE, &item.id, now)
        {
            return cached;
        }

        match self.rewriter.rewrite(&item.summary).await {
            Ok(text) if !text.trim().is_empty() => {
                let ttl = self.cache.config().file_ttl();
                if let Err(e) = self.cache.set(REWRITE_NAMESPACE, &item.id, &text, ttl, now) {
                    tracing::warn!(content_id = %item.id, error = %e, "failed to cache rewrite");
                }
                text
            }
            Ok(_) => item.summary.clone(),
            Err(e) => {
                tracing::warn!(
                    content_id = %item.id,
                    error = %e,
                    "rewrite failed, publishing raw text"
                );
                item.summary.clone()
            }
        }
    }
}
