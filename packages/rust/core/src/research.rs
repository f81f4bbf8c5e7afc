//! Research step: reference URLs (or search hits) → summary.
//!
//! Each source is fetched and summarized independently; a source that fails
//! is recorded in `skipped` and the rest carry on. When nothing usable comes
//! back the step degrades to a background-knowledge summary from the model
//! and marks the result `is_fallback`.

use tracing::{info, instrument, warn};

use contentforge_llm::{CompletionRequest, TextCompletion};
use contentforge_shared::{
    ContentForgeError, ResearchConfig, ResearchResult, Result, RunRequest, SourceFailure,
};
use contentforge_web::{WebFetcher, WebSearch};

use crate::retry::{RetryPolicy, execute_with_retry};

/// Prefix placed on every fallback summary.
pub const FALLBACK_NOTICE: &str =
    "[Background knowledge only: no source content was retrieved, facts are unverified.]";

const RESEARCH_SYSTEM: &str = "You are an expert researcher. You extract accurate, \
well-structured facts from source material and never invent citations.";

/// Tunables for the research step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResearchOptions {
    /// Characters of page text sent to the summarizer per source.
    pub max_source_chars: usize,
    /// Search hits to research when the request has no URLs.
    pub search_results: usize,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self::from(&ResearchConfig::default())
    }
}

impl From<&ResearchConfig> for ResearchOptions {
    fn from(config: &ResearchConfig) -> Self {
        Self {
            max_source_chars: config.max_source_chars,
            search_results: config.search_results,
        }
    }
}

/// Runs the research step against the configured collaborators.
pub struct Researcher<'a> {
    completion: &'a dyn TextCompletion,
    fetcher: &'a dyn WebFetcher,
    search: Option<&'a dyn WebSearch>,
    policy: RetryPolicy,
    options: ResearchOptions,
}

impl<'a> Researcher<'a> {
    pub fn new(
        completion: &'a dyn TextCompletion,
        fetcher: &'a dyn WebFetcher,
        policy: RetryPolicy,
        options: ResearchOptions,
    ) -> Self {
        Self {
            completion,
            fetcher,
            search: None,
            policy,
            options,
        }
    }

    /// Use live search when a request carries no reference URLs.
    pub fn with_search(mut self, search: Option<&'a dyn WebSearch>) -> Self {
        self.search = search;
        self
    }

    /// Produce a research summary for `request`.
    ///
    /// Fails only when every source failed and the fallback summary also
    /// failed.
    #[instrument(skip_all, fields(topic = %request.topic(), urls = request.reference_urls.len()))]
    pub async fn research(&self, request: &RunRequest) -> Result<ResearchResult> {
        let topic = request.topic();

        let urls = if !request.reference_urls.is_empty() {
            request
                .reference_urls
                .iter()
                .map(|u| u.trim().to_string())
                .collect()
        } else {
            self.search_urls(topic).await
        };

        let mut skipped = Vec::new();
        let mut sections = Vec::new();
        let mut sources = Vec::new();

        for url in &urls {
            match self.research_source(topic, url).await {
                Ok(summary) => {
                    sections.push(format!("### Source: {url}\n\n{summary}"));
                    sources.push(url.clone());
                }
                Err(e) => {
                    warn!(%url, error = %e, "source skipped");
                    skipped.push(SourceFailure {
                        url: url.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !sources.is_empty() {
            info!(
                sources = sources.len(),
                skipped = skipped.len(),
                "research complete"
            );
            return Ok(ResearchResult {
                summary: sections.join("\n\n"),
                sources,
                is_fallback: false,
                skipped,
            });
        }

        if !urls.is_empty() {
            warn!(attempted = urls.len(), "no source yielded content, using fallback");
        } else {
            info!("no sources to research, using fallback");
        }

        let summary = self.fallback_summary(request).await.map_err(|e| {
            ContentForgeError::Research(format!(
                "{} of {} sources failed and the fallback summary failed: {e}",
                skipped.len(),
                urls.len()
            ))
        })?;

        Ok(ResearchResult {
            summary,
            sources: Vec::new(),
            is_fallback: true,
            skipped,
        })
    }

    /// Ask the search collaborator for URLs; any failure means "no URLs".
    async fn search_urls(&self, topic: &str) -> Vec<String> {
        let Some(search) = self.search else {
            return Vec::new();
        };
        if topic.is_empty() {
            return Vec::new();
        }

        let limit = self.options.search_results;
        match execute_with_retry(&self.policy, "web search", || search.search(topic, limit)).await
        {
            Ok(urls) => urls,
            Err(e) => {
                warn!(error = %e, "web search failed");
                Vec::new()
            }
        }
    }

    /// Fetch one URL and summarize it.
    async fn research_source(&self, topic: &str, url: &str) -> Result<String> {
        let label = format!("fetch {url}");
        let content =
            execute_with_retry(&self.policy, &label, || self.fetcher.fetch_text(url)).await?;

        let request = CompletionRequest::new(source_prompt(
            topic,
            url,
            &truncate_content(&content, self.options.max_source_chars),
        ))
        .system(RESEARCH_SYSTEM)
        .max_tokens(800)
        .temperature(0.2);

        let label = format!("summarize {url}");
        let completion =
            execute_with_retry(&self.policy, &label, || self.completion.complete(&request))
                .await?;

        let summary = completion.text.trim();
        if summary.is_empty() {
            return Err(ContentForgeError::parse(format!(
                "{url}: model returned an empty summary"
            )));
        }
        Ok(summary.to_string())
    }

    /// Topic-only summary from the model's background knowledge.
    async fn fallback_summary(&self, request: &RunRequest) -> Result<String> {
        let prompt = fallback_prompt(request);
        let completion_request = CompletionRequest::new(prompt)
            .system(RESEARCH_SYSTEM)
            .max_tokens(900)
            .temperature(0.3);

        let completion = execute_with_retry(&self.policy, "fallback summary", || {
            self.completion.complete(&completion_request)
        })
        .await?;

        let body = completion.text.trim();
        if body.is_empty() {
            return Err(ContentForgeError::parse("model returned an empty fallback summary"));
        }
        Ok(format!("{FALLBACK_NOTICE}\n\n{body}"))
    }
}

fn source_prompt(topic: &str, url: &str, content: &str) -> String {
    let focus = if topic.is_empty() {
        "the main subject of the page".to_string()
    } else {
        format!("the topic \"{topic}\"")
    };
    format!(
        "Source URL: {url}\n\n\
         Summarize the content below as it relates to {focus}. \
         Keep key facts, figures, dates and arguments. Use concise bullet points \
         and do not add information that is not in the content.\n\n\
         --- CONTENT ---\n{content}"
    )
}

fn fallback_prompt(request: &RunRequest) -> String {
    let subject = if request.topic().is_empty() {
        format!(
            "the subject suggested by these URLs (their content could not be retrieved): {}",
            request.reference_urls.join(", ")
        )
    } else {
        format!("\"{}\"", request.topic())
    };
    format!(
        "No live research is available. Using only your background knowledge, \
         write a structured research summary about {subject}. Cover context, key \
         facts, current trends and open questions. Say so where you are unsure, \
         and do not cite specific sources or statistics you cannot vouch for."
    )
}

/// Truncate to at most `max_chars` characters on a char boundary.
fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((cut, _)) => {
            format!("{}\n\n[... content truncated ...]", &content[..cut])
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{FakeFetcher, FakeSearch, ScriptedCompletion};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::ZERO)
    }

    fn summarizer() -> ScriptedCompletion {
        ScriptedCompletion::new(|req| {
            if req.prompt.contains("Source URL:") {
                Ok("- key point from source".into())
            } else {
                Ok("background overview".into())
            }
        })
    }

    #[tokio::test]
    async fn no_urls_uses_fallback() {
        let completion = summarizer();
        let fetcher = FakeFetcher::new();
        let researcher =
            Researcher::new(&completion, &fetcher, policy(), ResearchOptions::default());

        let result = researcher
            .research(&RunRequest::new("renewable energy"))
            .await
            .unwrap();

        assert!(result.is_fallback);
        assert!(result.sources.is_empty());
        assert!(result.summary.starts_with(FALLBACK_NOTICE));
        assert!(result.summary.contains("background overview"));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn all_urls_failing_falls_back_with_empty_sources() {
        let completion = summarizer();
        let fetcher = FakeFetcher::new();
        let researcher =
            Researcher::new(&completion, &fetcher, policy(), ResearchOptions::default());

        let request =
            RunRequest::new("renewable energy").with_urls(["https://bad.invalid/404"]);
        let result = researcher.research(&request).await.unwrap();

        assert!(result.is_fallback);
        assert!(result.sources.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].url, "https://bad.invalid/404");
        // Network failures are transient, so the fetch was retried.
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn partial_success_keeps_only_good_sources() {
        let completion = summarizer();
        let fetcher = FakeFetcher::new()
            .page("https://good.example/a", "Solar output rose 20%.")
            .page("https://good.example/c", "Wind output rose 10%.");
        let researcher =
            Researcher::new(&completion, &fetcher, policy(), ResearchOptions::default());

        let request = RunRequest::new("energy").with_urls([
            "https://good.example/a",
            "https://bad.invalid/b",
            "https://good.example/c",
        ]);
        let result = researcher.research(&request).await.unwrap();

        assert!(!result.is_fallback);
        assert_eq!(
            result.sources,
            ["https://good.example/a", "https://good.example/c"]
        );
        assert_eq!(result.skipped.len(), 1);
        assert!(result.summary.contains("### Source: https://good.example/a"));
        assert!(!result.summary.contains(FALLBACK_NOTICE));
    }

    #[tokio::test]
    async fn failing_summary_counts_as_failed_source() {
        let completion = ScriptedCompletion::new(|req| {
            if req.prompt.contains("Source URL:") {
                Err(ContentForgeError::Api {
                    status: 400,
                    message: "content policy".into(),
                })
            } else {
                Ok("background overview".into())
            }
        });
        let fetcher = FakeFetcher::new().page("https://good.example/a", "text");
        let researcher =
            Researcher::new(&completion, &fetcher, policy(), ResearchOptions::default());

        let request = RunRequest::new("energy").with_urls(["https://good.example/a"]);
        let result = researcher.research(&request).await.unwrap();

        assert!(result.is_fallback);
        assert!(result.skipped[0].reason.contains("content policy"));
    }

    #[tokio::test]
    async fn both_paths_failing_is_research_error() {
        let completion = ScriptedCompletion::new(|_| {
            Err(ContentForgeError::Api {
                status: 401,
                message: "bad key".into(),
            })
        });
        let fetcher = FakeFetcher::new();
        let researcher =
            Researcher::new(&completion, &fetcher, policy(), ResearchOptions::default());

        let request = RunRequest::new("energy").with_urls(["https://bad.invalid/x"]);
        let err = researcher.research(&request).await.unwrap_err();

        assert!(matches!(err, ContentForgeError::Research(_)));
    }

    #[tokio::test]
    async fn search_hits_are_researched_when_no_urls_given() {
        let completion = summarizer();
        let fetcher = FakeFetcher::new().page("https://found.example/1", "Heat pumps explained.");
        let search = FakeSearch::returning(["https://found.example/1"]);
        let researcher =
            Researcher::new(&completion, &fetcher, policy(), ResearchOptions::default())
                .with_search(Some(&search as &dyn WebSearch));

        let result = researcher.research(&RunRequest::new("heat pumps")).await.unwrap();

        assert!(!result.is_fallback);
        assert_eq!(result.sources, ["https://found.example/1"]);
    }

    #[tokio::test]
    async fn failed_search_falls_back() {
        let completion = summarizer();
        let fetcher = FakeFetcher::new();
        let search = FakeSearch::failing();
        let researcher =
            Researcher::new(&completion, &fetcher, policy(), ResearchOptions::default())
                .with_search(Some(&search as &dyn WebSearch));

        let result = researcher.research(&RunRequest::new("heat pumps")).await.unwrap();

        assert!(result.is_fallback);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "héllo wörld";
        let out = truncate_content(text, 4);
        assert!(out.starts_with("héll"));
        assert!(out.contains("truncated"));
        assert_eq!(truncate_content("short", 100), "short");
    }

    #[test]
    fn fallback_prompt_mentions_urls_without_topic() {
        let request = RunRequest::new("").with_urls(["https://a.example/post"]);
        assert!(fallback_prompt(&request).contains("https://a.example/post"));
    }
}
