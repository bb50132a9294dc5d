//! Common utilities and helpers

pub mod fs;
pub mod retry;

pub use fs::{atomic_write_json, read_json};
pub use retry::{with_retry, BackoffConfig};
