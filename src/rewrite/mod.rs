//! Rewrite collaborator: best-effort text polishing
//!
//! Raw catalog text is passed through an LLM generate endpoint before
//! publishing. The contract is deliberately weak: rewrite failures are never
//! fatal, the caller falls back to the raw text. When no endpoint is
//! configured, the passthrough implementation is used.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::retry::{with_retry, BackoffConfig};

/// Configuration for the rewrite client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Generate endpoint; `None` disables rewriting
    pub endpoint: Option<String>,

    /// API key sent as a bearer token, when required
    pub api_key: Option<String>,

    /// Model name forwarded to the endpoint
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "qwen2.5:7b".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Turns raw catalog text into publish-ready text
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, raw: &str) -> Result<String>;
}

/// No-op rewriter used when no endpoint is configured
pub struct PassthroughRewriter;

#[async_trait]
impl Rewriter for PassthroughRewriter {
    async fn rewrite(&self, raw: &str) -> Result<String> {
        Ok(raw.to_string())
    }
}

/// Generate request body
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

/// Generate response body
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// HTTP client for an LLM generate endpoint
pub struct LlmRewriter {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    backoff: BackoffConfig,
}

impl LlmRewriter {
    pub fn new(config: &RewriteConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| Error::config("rewrite endpoint is not set"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            backoff: BackoffConfig::default(),
        })
    }

    fn build_prompt(raw: &str) -> String {
        format!(
            "Rewrite the following product description into a natural, \
             reader-friendly article body. Keep every factual detail, remove \
             marketing boilerplate, and return only the rewritten text.\n\n{raw}"
        )
    }
}

#[async_trait]
impl Rewriter for LlmRewriter {
    async fn rewrite(&self, raw: &str) -> Result<String> {
        with_retry(&self.backoff, || async {
            let body = GenerateRequest {
                model: &self.model,
                prompt: Self::build_prompt(raw),
                stream: false,
            };

            let mut request = self.client.post(&self.endpoint).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = request.send().await?.error_for_status()?;
            let generated: GenerateResponse = response.json().await?;

            tracing::debug!(
                input_len = raw.len(),
                output_len = generated.response.len(),
                "text rewritten"
            );
            Ok(generated.response)
        })
        .await
    }
}

/// Build a rewriter from config: the LLM client when an endpoint is set,
/// passthrough otherwise.
pub fn from_config(config: &RewriteConfig) -> Result<Box<dyn Rewriter>> {
    match config.endpoint {
        Some(_) => Ok(Box::new(LlmRewriter::new(config)?)),
        None => {
            tracing::info!("no rewrite endpoint configured, publishing raw text");
            Ok(Box::new(PassthroughRewriter))
        }
    }
}
