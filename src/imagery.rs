//! Image search collaborator: find a product photo by text query and fetch
//! the first candidate that actually loads. Everything here is best-effort;
//! no photo is a degraded outcome, never a hard failure.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("image search request failed: {0}")]
    Transport(String),
    #[error("image search returned unexpected payload: {0}")]
    Payload(String),
    #[error("image search endpoint not configured")]
    NotConfigured,
}

#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// Candidate image URLs for a text query, best first. May be empty.
    async fn search(&self, query: &str) -> Result<Vec<String>, SearchError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    url: String,
}

pub struct HttpImageSearch {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpImageSearch {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ImageSearch for HttpImageSearch {
    async fn search(&self, query: &str) -> Result<Vec<String>, SearchError> {
        let mut request = self.client.get(&self.endpoint).query(&[("q", query)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SearchError::Transport(format!("HTTP {}", resp.status())));
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::Payload(e.to_string()))?;
        Ok(parsed.results.into_iter().map(|hit| hit.url).collect())
    }
}

/// Try each candidate in order, each attempt bounded by its own timeout,
/// stopping at the first image that loads. Returns the image base64-encoded
/// for embedding, or `None` when every candidate fails.
pub async fn first_loadable(
    client: &Client,
    candidates: &[String],
    per_attempt: Duration,
) -> Option<String> {
    for url in candidates {
        match tokio::time::timeout(per_attempt, fetch_image(client, url)).await {
            Ok(Ok(encoded)) => return Some(encoded),
            Ok(Err(e)) => debug!("Image candidate {} failed: {}", url, e),
            Err(_) => debug!("Image candidate {} timed out", url),
        }
    }
    None
}

async fn fetch_image(client: &Client, url: &str) -> Result<String, reqwest::Error> {
    let resp = client.get(url).send().await?.error_for_status()?;
    let bytes = resp.bytes().await?;
    Ok(BASE64.encode(&bytes))
}
