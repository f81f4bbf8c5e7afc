//! OpenAI-compatible chat completion client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use contentforge_shared::{ContentForgeError, Result};

use crate::{Completion, CompletionRequest, TextCompletion};

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("ContentForge/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatClient {
    /// Create a client for the given endpoint and model.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ContentForgeError::config(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TextCompletion for OpenAiCompatClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = request.prompt.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let start = Instant::now();

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "completion request failed");
                if e.is_timeout() {
                    ContentForgeError::Timeout {
                        label: "chat completion".into(),
                        secs: start.elapsed().as_secs_f64(),
                    }
                } else {
                    ContentForgeError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "completion API error");
            return Err(ContentForgeError::from_status(status.as_u16(), error_text));
        }

        let raw = response.text().await.map_err(|e| {
            warn!(error = %e, "failed to read completion body");
            if e.is_timeout() {
                ContentForgeError::Timeout {
                    label: "chat completion body".into(),
                    secs: start.elapsed().as_secs_f64(),
                }
            } else {
                ContentForgeError::Network(format!("failed to read completion body: {e}"))
            }
        })?;

        let chat: ChatResponse = serde_json::from_str(&raw)
            .map_err(|e| ContentForgeError::parse(format!("invalid completion response: {e}")))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ContentForgeError::parse("no choices in completion response"))?;

        let usage = chat.usage.unwrap_or_default();
        let latency_ms = start.elapsed().as_millis() as u64;

        debug!(
            tokens_in = usage.prompt_tokens,
            tokens_out = usage.completion_tokens,
            latency_ms,
            "chat completion"
        );

        Ok(Completion {
            text,
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
            model: chat.model.unwrap_or_else(|| self.model.clone()),
            latency_ms,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
