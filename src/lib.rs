//! yoyaku - Publish scheduling and deduplication engine
//!
//! A scheduling core for automated CMS posting: discovered content ids are
//! deduplicated against a durable registry, assigned to fixed-interval publish
//! slots, and executed by a poll-driven executor that survives crashes and
//! remote failures.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`registry`] - Durable set of already-published content ids
//! - [`cursor`] - Persisted discovery pagination position
//! - [`cache`] - Two-tier (memory + file) read-through cache
//! - [`schedule`] - Slot allocation, entry state machine, retry policy
//! - [`executor`] - Poll-driven execution of due schedule entries
//! - [`discovery`] / [`rewrite`] / [`publish`] - External collaborator seams
//! - [`pipeline`] - Intake orchestration (discover, filter, schedule)
//! - [`utils`] - Atomic persistence and backoff helpers
//!
//! # Example
//!
//! ```no_run
//! use yoyaku::config::Config;
//! use yoyaku::engine::Engine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let engine = Engine::open(config)?;
//!     let status = engine.status(chrono::Utc::now());
//!     println!("{}", serde_json::to_string_pretty(&status)?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod cursor;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod executor;
pub mod models;
pub mod pipeline;
pub mod publish;
pub mod registry;
pub mod rewrite;
pub mod schedule;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::Engine;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::executor::{BatchSummary, ExecutionOutcome, Executor};
    pub use crate::models::{CandidateItem, PublishPayload};
    pub use crate::registry::PostRegistry;
    pub use crate::schedule::{EntryStatus, Priority, RetryPolicy, ScheduleEntry, ScheduleManager};
}

// Direct re-exports for convenience
pub use models::{CandidateItem, PublishPayload};
