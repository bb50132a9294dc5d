//! Discovery collaborator: enumerates candidate content ids
//!
//! The engine only depends on the [`Discovery`] trait. The HTTP
//! implementation pages through a catalog REST endpoint with offset/limit
//! query parameters; pagination position is owned by the
//! [`crate::cursor::OffsetCursor`], never by this client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::models::CandidateItem;
use crate::utils::retry::{with_retry, BackoffConfig};

/// Configuration for the catalog client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Catalog search endpoint
    pub base_url: String,

    /// API key sent as a query parameter, when the catalog requires one
    pub api_key: Option<String>,

    /// Window size per fetch
    pub batch_size: u64,

    /// How many unposted candidates one harvest run wants
    pub required_count: u64,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            batch_size: 100,
            required_count: 5,
            timeout_secs: 30,
        }
    }
}

/// Enumerates candidate items from an external catalog
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Fetch one window of candidates starting at `offset`
    async fn fetch(&self, offset: u64, limit: u64) -> Result<Vec<CandidateItem>>;
}

/// One page of catalog results
#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    items: Vec<CandidateItem>,
}

/// HTTP client for an offset-paginated catalog endpoint
pub struct CatalogClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    backoff: BackoffConfig,
}

impl CatalogClient {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(Error::config("discovery base_url is not set"));
        }

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::config(format!("invalid discovery base_url: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            backoff: BackoffConfig::default(),
        })
    }
}

#[async_trait]
impl Discovery for CatalogClient {
    async fn fetch(&self, offset: u64, limit: u64) -> Result<Vec<CandidateItem>> {
        with_retry(&self.backoff, || async {
            let mut request = self.client.get(self.base_url.clone()).query(&[
                ("offset", offset.to_string()),
                ("hits", limit.to_string()),
            ]);
            if let Some(key) = &self.api_key {
                request = request.query(&[("api_key", key.as_str())]);
            }

            let response = request.send().await?.error_for_status()?;
            let page: CatalogPage = response.json().await?;

            tracing::debug!(
                offset = offset,
                limit = limit,
                fetched = page.items.len(),
                "catalog window fetched"
            );
            Ok(page.items)
        })
        .await
    }
}
