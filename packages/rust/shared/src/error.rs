//! Error types for ContentForge.
//!
//! Library crates use [`ContentForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::Platform;

/// Top-level error type for all ContentForge operations.
#[derive(Debug, thiserror::Error)]
pub enum ContentForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The run request failed validation.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Transport-level HTTP failure (connect, DNS, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The remote service signalled rate limiting (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A single external call exceeded its time budget.
    #[error("call timed out after {secs:.1}s: {label}")]
    Timeout { label: String, secs: f64 },

    /// Non-success response from a remote API.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Malformed or unexpected response payload.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A transient failure persisted through every allowed attempt.
    #[error("{label}: gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        label: String,
        attempts: u32,
        last: Box<ContentForgeError>,
    },

    /// Both the source-backed and the fallback research paths failed.
    #[error("research failed: {0}")]
    Research(String),

    /// Draft generation failed for one platform.
    #[error("generation failed for {platform}: {source}")]
    Generation {
        platform: Platform,
        source: Box<ContentForgeError>,
    },

    /// Writing the run output failed.
    #[error("failed to persist run output at {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ContentForgeError>;

impl ContentForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a write failure of run output.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Tag a failure with the platform whose draft it prevented.
    pub fn generation(platform: Platform, source: ContentForgeError) -> Self {
        Self::Generation {
            platform,
            source: Box::new(source),
        }
    }

    /// Whether a retry of the same call may succeed.
    ///
    /// Rate limits, timeouts, transport failures and 5xx responses are
    /// transient; everything else is a permanent rejection.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Timeout { .. } | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map an HTTP status plus body into the matching error variant.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            429 => Self::RateLimited(message),
            _ => Self::Api { status, message },
        }
    }
}
