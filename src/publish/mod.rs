//! Publish collaborator: the CMS write operation
//!
//! The engine only depends on the [`Publisher`] trait; the HTTP
//! implementation targets a WordPress-style REST endpoint with application
//! passwords. Every request carries a deterministic dedupe key (the content
//! id, sent as the post slug) so the remote side can reject accidental
//! re-sends where supported.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Configuration for the CMS client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// CMS site base URL (e.g. https://blog.example.com)
    pub endpoint: String,

    /// REST API username
    pub username: String,

    /// Application password
    pub app_password: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: String::new(),
            app_password: String::new(),
            timeout_secs: 30,
        }
    }
}

/// A publish request assembled from a schedule entry
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Post title
    pub title: String,

    /// Publish-ready body
    pub body: String,

    /// Slot the entry was scheduled for
    pub target_time: DateTime<Utc>,

    /// Deterministic dedupe key (the content id)
    pub dedupe_key: String,

    /// Tags forwarded to the CMS
    pub tags: Vec<String>,
}

/// Outcome of a publish call, recorded on the completed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Whether the remote accepted the post
    pub success: bool,

    /// Remote post id, when the call succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<u64>,

    /// Public URL of the created post
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    /// Error detail, when the call failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishReceipt {
    /// Successful receipt
    pub fn accepted(remote_id: u64, remote_url: impl Into<String>) -> Self {
        Self {
            success: true,
            remote_id: Some(remote_id),
            remote_url: Some(remote_url.into()),
            error: None,
        }
    }

    /// Failed receipt
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            remote_id: None,
            remote_url: None,
            error: Some(error.into()),
        }
    }

    /// Receipt for an entry whose content id was already in the registry;
    /// no remote call was made.
    pub fn skipped_duplicate() -> Self {
        Self {
            success: true,
            remote_id: None,
            remote_url: None,
            error: Some("skipped: content id already posted".to_string()),
        }
    }
}

/// The CMS write operation
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Create a post. Transport failures return `Err`; a reachable CMS that
    /// rejects the post returns `Ok` with `success == false`.
    async fn create(&self, request: &PublishRequest) -> Result<PublishReceipt>;
}

/// WordPress-style REST response for a created post
#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: u64,
    link: String,
}

/// REST payload for post creation
#[derive(Debug, Serialize)]
struct CreatePostBody<'a> {
    title: &'a str,
    content: &'a str,
    status: &'a str,
    slug: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

/// HTTP client for a WordPress-style CMS REST API
pub struct CmsClient {
    client: Client,
    posts_url: Url,
    username: String,
    app_password: String,
}

impl CmsClient {
    /// Create a client from config. Fails fast on a missing or unparsable
    /// endpoint; nothing else in the engine can proceed without a publisher.
    pub fn new(config: &PublisherConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(Error::config("publisher endpoint is not set"));
        }

        let base = Url::parse(&config.endpoint)
            .map_err(|e| Error::config(format!("invalid publisher endpoint: {e}")))?;
        let posts_url = base
            .join("wp-json/wp/v2/posts")
            .map_err(|e| Error::config(format!("invalid publisher endpoint: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            posts_url,
            username: config.username.clone(),
            app_password: config.app_password.clone(),
        })
    }
}

#[async_trait]
impl Publisher for CmsClient {
    async fn create(&self, request: &PublishRequest) -> Result<PublishReceipt> {
        let body = CreatePostBody {
            title: &request.title,
            content: &request.body,
            status: "publish",
            slug: &request.dedupe_key,
            tags: request.tags.clone(),
        };

        let response = self
            .client
            .post(self.posts_url.clone())
            .basic_auth(&self.username, Some(&self.app_password))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let created: CreatedPost = response.json().await?;
            tracing::info!(
                remote_id = created.id,
                url = %created.link,
                dedupe_key = %request.dedupe_key,
                "post created"
            );
            Ok(PublishReceipt::accepted(created.id, created.link))
        } else {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                dedupe_key = %request.dedupe_key,
                "CMS rejected post"
            );
            Ok(PublishReceipt::rejected(format!("{status}: {detail}")))
        }
    }
}
