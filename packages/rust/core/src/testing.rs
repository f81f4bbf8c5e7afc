//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use contentforge_llm::{Completion, CompletionRequest, TextCompletion};
use contentforge_shared::{ContentForgeError, Result};
use contentforge_web::{WebFetcher, WebSearch};

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync>;
type Pacer = Box<dyn Fn(&CompletionRequest) -> Duration + Send + Sync>;

/// Completion service driven by a closure over the request.
pub struct ScriptedCompletion {
    responder: Responder,
    pacer: Option<Pacer>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(responder: impl Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            pacer: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep for the returned duration before answering.
    pub fn with_delay(
        mut self,
        pacer: impl Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.pacer = Some(Box::new(pacer));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(pacer) = &self.pacer {
            let delay = pacer(request);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let text = (self.responder)(request)?;
        Ok(Completion {
            text,
            model: "scripted".into(),
            ..Completion::default()
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Fetcher serving canned pages; unknown URLs fail with a network error.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), text.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebFetcher for FakeFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ContentForgeError::Network(format!("{url}: dns lookup failed")))
    }
}

/// Search returning a fixed hit list, or a permanent failure.
pub struct FakeSearch {
    hits: Option<Vec<String>>,
}

impl FakeSearch {
    pub fn returning<I, S>(hits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hits: Some(hits.into_iter().map(Into::into).collect()),
        }
    }

    pub fn failing() -> Self {
        Self { hits: None }
    }
}

#[async_trait]
impl WebSearch for FakeSearch {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<String>> {
        match &self.hits {
            Some(hits) => Ok(hits.iter().take(limit).cloned().collect()),
            None => Err(ContentForgeError::Api {
                status: 403,
                message: "invalid search key".into(),
            }),
        }
    }
}
