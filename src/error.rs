//! Unified error handling for the yoyaku crate
//!
//! A single `Error` enum covers the whole engine. The taxonomy matters more
//! than usual here: persistence failures must abort the operation that raised
//! them (they threaten the dedup invariant), while publish failures are
//! absorbed by the retry policy and never cross the batch boundary.
//!
//! # Architecture
//!
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum for all engine operations
//! - [`Result`] - Result alias used across the crate

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration and validation errors
    Config,
    /// Durable write could not be completed or verified
    Storage,
    /// Network-related errors (HTTP, timeout)
    Network,
    /// Scheduling and state machine errors
    Scheduling,
    /// Publish collaborator errors
    Publishing,
}

/// Unified error type for the yoyaku crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (fatal at startup)
    #[error("Config error: {0}")]
    Config(String),

    /// A durable write could not be completed or verified.
    ///
    /// For the post registry this aborts the calling operation and rolls back
    /// the in-memory change; swallowing it would permit duplicate publishing.
    #[error("Persistence error at {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    /// Publish collaborator failure (recoverable via the retry policy)
    #[error("Publish error: {reason}")]
    Publish { reason: String },

    /// An entry ran out of retry attempts and moved to the failed log.
    ///
    /// Surfaced in status reporting; never thrown across the batch boundary.
    #[error("Entry {entry_id} exhausted after {attempts} attempts")]
    ExhaustedRetries { entry_id: String, attempts: u32 },

    /// A schedule operation referenced an entry that is not in the active map
    #[error("Unknown schedule entry: {0}")]
    UnknownEntry(String),

    /// A schedule entry was asked to make a transition its status forbids
    #[error("Invalid transition for entry {id}: {detail}")]
    InvalidTransition { id: String, detail: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a publish error
    pub fn publish(reason: impl Into<String>) -> Self {
        Self::Publish {
            reason: reason.into(),
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Persistence { .. } => false,
            Self::Publish { .. } => true,
            Self::ExhaustedRetries { .. } => false,
            Self::UnknownEntry(_) => false,
            Self::InvalidTransition { .. } => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Http(_) => true, // HTTP errors are often transient
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::Persistence { .. } | Self::Io(_) | Self::Json(_) => ErrorCategory::Storage,
            Self::Publish { .. } => ErrorCategory::Publishing,
            Self::ExhaustedRetries { .. } | Self::UnknownEntry(_) | Self::InvalidTransition { .. } => {
                ErrorCategory::Scheduling
            }
            Self::Http(_) => ErrorCategory::Network,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
