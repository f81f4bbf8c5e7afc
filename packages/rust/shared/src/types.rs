//! Core domain types for ContentForge runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{ContentForgeError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// RunRequest
// ---------------------------------------------------------------------------

/// What the caller asked for: a topic, reference URLs, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Subject of the content. May be empty when reference URLs are given.
    #[serde(default)]
    pub topic: String,
    /// Pages to research, in caller order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_urls: Vec<String>,
}

impl RunRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            reference_urls: Vec::new(),
        }
    }

    pub fn with_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// The topic with surrounding whitespace removed.
    pub fn topic(&self) -> &str {
        self.topic.trim()
    }

    /// Check the request invariants.
    ///
    /// At least one of topic or reference URLs must be present, and every
    /// URL must be an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        if self.topic().is_empty() && self.reference_urls.is_empty() {
            return Err(ContentForgeError::validation(
                "a topic or at least one reference URL is required",
            ));
        }

        for raw in &self.reference_urls {
            let url = Url::parse(raw.trim()).map_err(|e| {
                ContentForgeError::validation(format!("invalid reference URL '{raw}': {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ContentForgeError::validation(format!(
                    "unsupported URL scheme '{}' in '{raw}'",
                    url.scheme()
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

/// A reference URL that contributed nothing to the research.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub url: String,
    pub reason: String,
}

/// Output of the research step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchResult {
    /// Summary text handed to every generation step.
    pub summary: String,
    /// URLs whose content backs the summary, in request order.
    #[serde(default)]
    pub sources: Vec<String>,
    /// True when no source content was used and the summary is
    /// model background knowledge only.
    pub is_fallback: bool,
    /// URLs that were attempted and failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SourceFailure>,
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Target platform for a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Blog,
    Linkedin,
    Twitter,
    Instagram,
}

impl Platform {
    /// Fixed generation and output order.
    pub const ALL: [Platform; 4] = [
        Platform::Blog,
        Platform::Linkedin,
        Platform::Twitter,
        Platform::Instagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blog => "blog",
            Self::Linkedin => "linkedin",
            Self::Twitter => "twitter",
            Self::Instagram => "instagram",
        }
    }

    /// Human-facing name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Blog => "Blog",
            Self::Linkedin => "LinkedIn",
            Self::Twitter => "X (Twitter)",
            Self::Instagram => "Instagram",
        }
    }

    /// Position within [`Platform::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Self::Blog => 0,
            Self::Linkedin => 1,
            Self::Twitter => 2,
            Self::Instagram => 3,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = ContentForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blog" => Ok(Self::Blog),
            "linkedin" => Ok(Self::Linkedin),
            "twitter" | "x" => Ok(Self::Twitter),
            "instagram" => Ok(Self::Instagram),
            other => Err(ContentForgeError::validation(format!(
                "unknown platform '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Drafts and results
// ---------------------------------------------------------------------------

/// Key under which Instagram drafts carry the suggested image.
pub const IMAGE_IDEA_KEY: &str = "image_idea";

/// Generated text for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDraft {
    pub platform: Platform,
    pub body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ContentDraft {
    pub fn new(platform: Platform, body: impl Into<String>) -> Self {
        Self {
            platform,
            body: body.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// A platform whose draft could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFailure {
    pub platform: Platform,
    pub error: String,
}

/// The aggregate record of one run. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub request: RunRequest,
    pub research: ResearchResult,
    /// Successful drafts in [`Platform::ALL`] order.
    pub drafts: Vec<ContentDraft>,
    #[serde(default)]
    pub failures: Vec<PlatformFailure>,
    pub generated_at: DateTime<Utc>,
}

impl RunResult {
    /// Look up the draft for a platform, if it was generated.
    pub fn draft(&self, platform: Platform) -> Option<&ContentDraft> {
        self.drafts.iter().find(|d| d.platform == platform)
    }
}
