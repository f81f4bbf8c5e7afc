//! Page fetching for the research step.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument, warn};

use contentforge_shared::{ContentForgeError, Result};

use crate::extract;

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("ContentForge/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Default timeout in seconds for one page fetch.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum response size we accept (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Something that turns a URL into readable text.
#[async_trait]
pub trait WebFetcher: Send + Sync {
    /// Fetch `url` and return its extracted text content.
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// reqwest-backed fetcher with HTML extraction.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ContentForgeError::config(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl WebFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ContentForgeError::Timeout {
                    label: url.to_string(),
                    secs: self.timeout.as_secs_f64(),
                }
            } else {
                ContentForgeError::Network(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "fetch returned non-success status");
            return Err(ContentForgeError::from_status(
                status.as_u16(),
                format!("{url}: HTTP {status}"),
            ));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(ContentForgeError::validation(format!(
                    "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
                )));
            }
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);

        let body = response
            .text()
            .await
            .map_err(|e| ContentForgeError::Network(format!("{url}: failed to read body: {e}")))?;

        let text = if is_html {
            extract::extract_text(&body)?
        } else {
            extract::normalize_plain(&body)
        };

        if text.is_empty() {
            return Err(ContentForgeError::parse(format!("{url}: no readable content")));
        }

        debug!(len = text.len(), "fetched page text");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_and_extracts_html() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "<html><body><nav>Menu</nav><article><h2>Wind</h2><p>Offshore farms expand.</p></article></body></html>",
                    "text/html",
                ),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let text = fetcher
            .fetch_text(&format!("{}/article", server.uri()))
            .await
            .unwrap();

        assert!(text.contains("Offshore farms expand."));
        assert!(!text.contains("Menu"));
    }

    #[tokio::test]
    async fn plain_text_passes_through() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/notes.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("line one\n\n\n\nline two\n", "text/plain"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let text = fetcher
            .fetch_text(&format!("{}/notes.txt", server.uri()))
            .await
            .unwrap();

        assert_eq!(text, "line one\n\nline two");
    }

    #[tokio::test]
    async fn not_found_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher
            .fetch_text(&format!("{}/404", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, ContentForgeError::Api { status: 404, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher
            .fetch_text(&format!("{}/busy", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, ContentForgeError::RateLimited(_)));
    }
}
