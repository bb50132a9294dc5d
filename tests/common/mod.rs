//! Shared fixtures and stub collaborators for integration tests

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use yoyaku::config::Config;
use yoyaku::discovery::Discovery;
use yoyaku::error::{Error, Result};
use yoyaku::models::{CandidateItem, PublishPayload};
use yoyaku::publish::{PublishReceipt, PublishRequest, Publisher};
use yoyaku::rewrite::Rewriter;

/// Config rooted in a temp directory
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.join("data");
    config.cache.dir = dir.join("data/cache");
    config
}

/// Candidate with an id-derived title and summary
pub fn candidate(id: &str) -> CandidateItem {
    CandidateItem {
        id: id.to_string(),
        title: format!("Title {id}"),
        summary: format!("Raw summary for {id}"),
        source_url: None,
        tags: vec![],
    }
}

/// Payload with an id-derived title and body
pub fn payload(id: &str) -> PublishPayload {
    PublishPayload {
        content_id: id.to_string(),
        title: format!("Title {id}"),
        body: format!("Body for {id}"),
        tags: vec![],
        source_url: None,
    }
}

/// In-memory catalog serving a fixed item list through offset/limit windows
pub struct StubCatalog {
    pub items: Vec<CandidateItem>,
}

#[async_trait]
impl Discovery for StubCatalog {
    async fn fetch(&self, offset: u64, limit: u64) -> Result<Vec<CandidateItem>> {
        let start = offset.saturating_sub(1) as usize;
        Ok(self
            .items
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Publisher stub: rejects the first `fail_first` calls, accepts the rest,
/// and records every accepted dedupe key in order.
pub struct StubPublisher {
    calls: AtomicU32,
    fail_first: u32,
    pub published: Mutex<Vec<String>>,
}

impl StubPublisher {
    pub fn always_ok() -> Self {
        Self::failing(0)
    }

    pub fn failing(fail_first: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_first,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for StubPublisher {
    async fn create(&self, request: &PublishRequest) -> Result<PublishReceipt> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if call <= self.fail_first {
            return Ok(PublishReceipt::rejected("stub: simulated CMS failure"));
        }

        self.published
            .lock()
            .unwrap()
            .push(request.dedupe_key.clone());
        Ok(PublishReceipt::accepted(
            1000 + u64::from(call),
            format!("https://cms.example.com/?p={call}"),
        ))
    }
}

/// Rewriter stub that marks its output
pub struct StubRewriter;

#[async_trait]
impl Rewriter for StubRewriter {
    async fn rewrite(&self, raw: &str) -> Result<String> {
        Ok(format!("rewritten: {raw}"))
    }
}

/// Rewriter stub that always fails (the pipeline must fall back to raw text)
pub struct FailingRewriter;

#[async_trait]
impl Rewriter for FailingRewriter {
    async fn rewrite(&self, _raw: &str) -> Result<String> {
        Err(Error::publish("stub: rewrite endpoint down"))
    }
}
