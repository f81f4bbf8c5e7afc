//! Text-completion service for ContentForge.
//!
//! This crate provides:
//! - [`TextCompletion`]: the capability the workflow consumes
//! - [`CompletionRequest`] / [`Completion`]: provider-neutral request/response
//! - [`OpenAiCompatClient`]: HTTP client for OpenAI-compatible chat APIs
//!   (OpenRouter by default)
//!
//! Errors are reported as `ContentForgeError` so the retry layer can tell a
//! rate limit (`RateLimited`) or server fault (`Api` with 5xx) from a
//! permanent rejection.

mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use contentforge_shared::Result;

pub use client::OpenAiCompatClient;

/// One prompt plus its generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Optional system instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Generated text plus usage accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub model: String,
    pub latency_ms: u64,
}

/// A service that turns a prompt into generated text.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Run one completion. Rate limiting must surface as
    /// `ContentForgeError::RateLimited`.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Model identifier, for logs and run metadata.
    fn model(&self) -> &str;
}
