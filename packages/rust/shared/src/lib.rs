//! Shared types, error model, and configuration for ContentForge.
//!
//! This crate is the foundation depended on by all other ContentForge crates.
//! It provides:
//! - [`ContentForgeError`]: the unified error type
//! - Domain types ([`RunRequest`], [`ResearchResult`], [`ContentDraft`], [`RunResult`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, LlmConfig, ResearchConfig, RetryConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{ContentForgeError, Result};
pub use types::{
    ContentDraft, IMAGE_IDEA_KEY, Platform, PlatformFailure, ResearchResult, RunId, RunRequest,
    RunResult, SourceFailure,
};
