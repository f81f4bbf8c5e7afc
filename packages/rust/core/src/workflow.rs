//! End-to-end run: validate → research → generate ×4 → persist.
//!
//! Platform failures never abort a run; they are collected into
//! [`RunResult::failures`]. Only validation and research errors stop a run
//! early. A persistence failure still hands back the in-memory result.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use contentforge_llm::TextCompletion;
use contentforge_shared::{
    AppConfig, ContentDraft, Platform, PlatformFailure, ResearchResult, Result, RunId,
    RunRequest, RunResult,
};
use contentforge_web::{WebFetcher, WebSearch};

use crate::generation::Generator;
use crate::persist::{self, PersistedRun};
use crate::research::{ResearchOptions, Researcher};
use crate::retry::RetryPolicy;

/// Number of platforms produced per run.
const PLATFORM_COUNT: usize = Platform::ALL.len();

/// Settings for a [`Workflow`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    pub output_dir: PathBuf,
    pub retry: RetryPolicy,
    pub research: ResearchOptions,
    /// Run the four generation calls concurrently.
    pub parallel_generation: bool,
}

impl WorkflowConfig {
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for WorkflowConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.defaults.output_dir),
            retry: RetryPolicy::from(&config.retry),
            research: ResearchOptions::from(&config.research),
            parallel_generation: config.defaults.parallel_generation,
        }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "step")]
pub enum RunState {
    Pending,
    Researching,
    /// Working on platform `k` of 4 (1-based). In parallel mode `k - 1`
    /// platforms have finished.
    Generating(usize),
    Persisting,
    Done,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Researching => f.write_str("researching"),
            Self::Generating(k) => write!(f, "generating {k}/{PLATFORM_COUNT}"),
            Self::Persisting => f.write_str("persisting"),
            Self::Done => f.write_str("done"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Progress callback for a run.
pub trait ProgressReporter: Send + Sync {
    /// Called on every state transition.
    fn state(&self, state: RunState);
    /// Fraction of platforms finished, in `[0, 1]`.
    fn fraction(&self, completed: f64);
    /// Called once per platform with its outcome.
    fn platform_finished(&self, _platform: Platform, _ok: bool) {}
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn state(&self, _state: RunState) {}
    fn fraction(&self, _completed: f64) {}
}

/// What a finished run hands back.
#[derive(Debug)]
pub struct RunOutcome {
    pub result: RunResult,
    /// Files written, or why writing failed.
    pub persisted: Result<PersistedRun>,
}

/// The content-generation workflow and its collaborators.
pub struct Workflow {
    config: WorkflowConfig,
    completion: Arc<dyn TextCompletion>,
    fetcher: Arc<dyn WebFetcher>,
    search: Option<Arc<dyn WebSearch>>,
}

impl Workflow {
    pub fn new(
        config: WorkflowConfig,
        completion: Arc<dyn TextCompletion>,
        fetcher: Arc<dyn WebFetcher>,
    ) -> Self {
        Self {
            config,
            completion,
            fetcher,
            search: None,
        }
    }

    /// Research search hits when a request has no reference URLs.
    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// Returns `Err` only for validation and research failures; everything
    /// later is reported inside the [`RunOutcome`].
    #[instrument(skip_all, fields(topic = %request.topic(), model = %self.completion.model()))]
    pub async fn run(
        &self,
        request: RunRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let start = Instant::now();
        let run_id = RunId::new();
        progress.state(RunState::Pending);
        info!(%run_id, urls = request.reference_urls.len(), "starting run");

        if let Err(e) = request.validate() {
            warn!(%run_id, error = %e, "request rejected");
            progress.state(RunState::Failed);
            return Err(e);
        }

        progress.state(RunState::Researching);
        let researcher = Researcher::new(
            self.completion.as_ref(),
            self.fetcher.as_ref(),
            self.config.retry,
            self.config.research,
        )
        .with_search(self.search.as_deref());

        let research = match researcher.research(&request).await {
            Ok(research) => research,
            Err(e) => {
                error!(%run_id, error = %e, "research failed, aborting run");
                progress.state(RunState::Failed);
                return Err(e);
            }
        };
        info!(
            %run_id,
            fallback = research.is_fallback,
            sources = research.sources.len(),
            "research finished"
        );

        let outcomes = if self.config.parallel_generation {
            self.generate_parallel(request.topic(), &research, progress)
                .await
        } else {
            self.generate_sequential(request.topic(), &research, progress)
                .await
        };

        let mut drafts = Vec::with_capacity(PLATFORM_COUNT);
        let mut failures = Vec::new();
        for (platform, outcome) in Platform::ALL.into_iter().zip(outcomes) {
            match outcome {
                Ok(draft) => drafts.push(draft),
                Err(e) => {
                    warn!(%run_id, %platform, error = %e, "platform failed, continuing");
                    failures.push(PlatformFailure {
                        platform,
                        error: e.to_string(),
                    });
                }
            }
        }

        progress.state(RunState::Persisting);
        let result = RunResult {
            run_id,
            request,
            research,
            drafts,
            failures,
            generated_at: Utc::now(),
        };

        let persisted = persist::persist_run(&self.config.output_dir, &result);
        match &persisted {
            Ok(files) => {
                info!(
                    run_id = %result.run_id,
                    drafts = result.drafts.len(),
                    failures = result.failures.len(),
                    record = %files.record_path.display(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "run complete"
                );
                progress.state(RunState::Done);
            }
            Err(e) => {
                error!(run_id = %result.run_id, error = %e, "failed to persist run output");
                progress.state(RunState::Failed);
            }
        }

        Ok(RunOutcome { result, persisted })
    }

    /// One platform after another, in [`Platform::ALL`] order.
    async fn generate_sequential(
        &self,
        topic: &str,
        research: &ResearchResult,
        progress: &dyn ProgressReporter,
    ) -> Vec<Result<ContentDraft>> {
        let generator = Generator::new(self.completion.as_ref(), self.config.retry);
        let mut outcomes = Vec::with_capacity(PLATFORM_COUNT);

        for (k, platform) in Platform::ALL.into_iter().enumerate() {
            progress.state(RunState::Generating(k + 1));
            let outcome = generator.generate(platform, topic, research).await;
            progress.platform_finished(platform, outcome.is_ok());
            progress.fraction((k + 1) as f64 / PLATFORM_COUNT as f64);
            outcomes.push(outcome);
        }

        outcomes
    }

    /// All four platforms at once; outcomes come back in [`Platform::ALL`]
    /// order regardless of completion order.
    async fn generate_parallel(
        &self,
        topic: &str,
        research: &ResearchResult,
        progress: &dyn ProgressReporter,
    ) -> Vec<Result<ContentDraft>> {
        let generator = Generator::new(self.completion.as_ref(), self.config.retry);
        let completed = AtomicUsize::new(0);

        progress.state(RunState::Generating(1));

        let track = |platform: Platform| {
            let generator = &generator;
            let completed = &completed;
            async move {
                let outcome = generator.generate(platform, topic, research).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress.platform_finished(platform, outcome.is_ok());
                progress.fraction(done as f64 / PLATFORM_COUNT as f64);
                if done < PLATFORM_COUNT {
                    progress.state(RunState::Generating(done + 1));
                }
                outcome
            }
        };

        let [blog, linkedin, twitter, instagram] = Platform::ALL;
        let (blog, linkedin, twitter, instagram) = tokio::join!(
            track(blog),
            track(linkedin),
            track(twitter),
            track(instagram)
        );

        vec![blog, linkedin, twitter, instagram]
    }
}
