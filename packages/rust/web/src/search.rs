//! Live web search used when a run has no reference URLs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use contentforge_shared::{ContentForgeError, Result};

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

/// Per-request timeout for search calls.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A service that finds URLs relevant to a query.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Return up to `limit` result URLs, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperHit>,
}

#[derive(Debug, Deserialize)]
struct SerperHit {
    #[serde(default)]
    link: Option<String>,
}

/// Serper (Google results) search client.
#[derive(Clone)]
pub struct SerperSearch {
    client: Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, SEARCH_TIMEOUT)
    }

    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ContentForgeError::config(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: SERPER_ENDPOINT.to_string(),
            timeout,
        })
    }

    /// Point the client at a different endpoint (proxies, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl WebSearch for SerperSearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest { q: query, num: limit })
            .send()
            .await
            .map_err(|e| ContentForgeError::Network(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, error = %error_text, "search API error");
            return Err(ContentForgeError::from_status(status.as_u16(), error_text));
        }

        let raw = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ContentForgeError::Timeout {
                    label: "search response body".into(),
                    secs: self.timeout.as_secs_f64(),
                }
            } else {
                ContentForgeError::Network(format!("failed to read search response: {e}"))
            }
        })?;

        let parsed: SerperResponse = serde_json::from_str(&raw)
            .map_err(|e| ContentForgeError::parse(format!("invalid search response: {e}")))?;

        let urls: Vec<String> = parsed
            .organic
            .into_iter()
            .filter_map(|hit| hit.link)
            .filter(|link| !link.is_empty())
            .take(limit)
            .collect();

        info!(results = urls.len(), "web search complete");
        Ok(urls)
    }
}
