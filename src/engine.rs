//! Process context owning every stateful component
//!
//! One `Engine` is constructed by the process entry point and borrowed by
//! the executor and the intake pipeline. There is no ambient global state;
//! everything the engine touches hangs off this struct.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{Cache, CacheStats};
use crate::config::Config;
use crate::cursor::{OffsetCursor, OffsetState};
use crate::error::Result;
use crate::registry::PostRegistry;
use crate::schedule::{ScheduleManager, ScheduleStatus, ScheduleStore};

/// Operator-facing status snapshot
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub schedule: ScheduleStatus,
    pub posted_total: usize,
    pub offset: Option<OffsetState>,
    pub cache: CacheStats,
}

/// Every stateful component of the engine, opened from one config
pub struct Engine {
    config: Config,
    pub registry: PostRegistry,
    pub cursor: OffsetCursor,
    pub manager: ScheduleManager,
    pub cache: Cache,
}

impl Engine {
    /// Validate the config and open all persisted components
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let registry = PostRegistry::open(config.storage.posted_ids_path())?;
        let cursor = OffsetCursor::new(config.storage.offset_path());
        let store = ScheduleStore::open(config.storage.schedule_dir())?;
        let manager = ScheduleManager::new(store, config.scheduler.clone(), config.retry.clone());
        let cache = Cache::open(config.cache.clone())?;

        tracing::info!(
            data_dir = %config.storage.data_dir.display(),
            posted = registry.posted_count(),
            active = manager.store().active().len(),
            "engine opened"
        );

        Ok(Self {
            config,
            registry,
            cursor,
            manager,
            cache,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Assemble the operator status report
    pub fn status(&self, now: DateTime<Utc>) -> StatusReport {
        StatusReport {
            generated_at: now,
            schedule: self.manager.status(now),
            posted_total: self.registry.posted_count(),
            offset: self.cursor.status(),
            cache: self.cache.stats(),
        }
    }

    /// Drop scheduled entries orphaned in the distant past
    pub fn cleanup(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let max_age = self.config.scheduler.cleanup_max_age();
        self.manager.cleanup(now, max_age)
    }
}
