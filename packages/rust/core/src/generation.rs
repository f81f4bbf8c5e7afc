//! Per-platform content generation.
//!
//! A [`PlatformProfile`] fixes the prompt and sampling parameters for each
//! platform. [`Generator::generate`] sends one completion through the retry
//! wrapper, then applies the platform's post-processing (length caps and the
//! Instagram image idea).

use tracing::{debug, info, instrument, warn};

use contentforge_llm::{CompletionRequest, TextCompletion};
use contentforge_shared::{
    ContentDraft, ContentForgeError, IMAGE_IDEA_KEY, Platform, ResearchResult, Result,
};

use crate::retry::{RetryPolicy, execute_with_retry};

const ELLIPSIS: char = '…';
const IMAGE_IDEA_PREFIX: &str = "IMAGE IDEA:";

/// Prompt and sampling parameters for one platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformProfile {
    pub platform: Platform,
    pub role: &'static str,
    pub instructions: &'static [&'static str],
    pub max_tokens: u32,
    pub temperature: f32,
    /// Hard cap on the draft body, in characters.
    pub max_chars: Option<usize>,
}

impl PlatformProfile {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Blog => Self {
                platform,
                role: "You are an expert blog writer who turns research into engaging, \
                       well-structured articles.",
                instructions: &[
                    "Write a detailed blog post about the topic in Markdown.",
                    "Open with an engaging introduction, develop the subject under clear \
                     subheadings, and finish with a strong conclusion.",
                    "Use Markdown for titles, lists and bold text.",
                    "Aim for at least 500 words.",
                    "Base claims on the research; mention sources where they exist and \
                     never invent information.",
                ],
                max_tokens: 2048,
                temperature: 0.7,
                max_chars: None,
            },
            Platform::Linkedin => Self {
                platform,
                role: "You are an expert in content marketing for LinkedIn.",
                instructions: &[
                    "Write a concise, professional LinkedIn post of two or three short \
                     paragraphs.",
                    "Focus on the impact for professionals and businesses.",
                    "Include 3-5 relevant hashtags.",
                    "Keep the tone professional yet accessible.",
                    "End with a question or call to action.",
                    "Plain text only, no Markdown.",
                ],
                max_tokens: 700,
                temperature: 0.7,
                max_chars: Some(3000),
            },
            Platform::Twitter => Self {
                platform,
                role: "You are a social media specialist writing for X (formerly Twitter).",
                instructions: &[
                    "Write one catchy tweet of at most 280 characters.",
                    "Highlight the most interesting or surprising point.",
                    "Include 2-3 relevant hashtags.",
                    "Use a conversational, direct tone; an emoji is welcome.",
                    "Output only the tweet text.",
                ],
                max_tokens: 160,
                temperature: 0.8,
                max_chars: Some(280),
            },
            Platform::Instagram => Self {
                platform,
                role: "You are a visual content creator and Instagram expert.",
                instructions: &[
                    "Write an engaging, visually descriptive Instagram caption.",
                    "Include 3-5 hashtags, mixing popular and niche ones.",
                    "Use emojis for visual appeal.",
                    "End with a question or call to action for the community.",
                    "On the final line write `IMAGE IDEA:` followed by one concrete idea \
                     for the accompanying image.",
                ],
                max_tokens: 600,
                temperature: 0.8,
                max_chars: None,
            },
        }
    }

    /// Build the completion request for `topic` given the research.
    pub fn request(&self, topic: &str, research: &ResearchResult) -> CompletionRequest {
        let mut prompt = String::new();

        prompt.push_str(&format!("Target platform: {}\n", self.platform.label()));
        if topic.is_empty() {
            prompt.push_str("Topic: infer it from the research below.\n\n");
        } else {
            prompt.push_str(&format!("Topic: {topic}\n\n"));
        }

        prompt.push_str("Instructions:\n");
        for line in self.instructions {
            prompt.push_str("- ");
            prompt.push_str(line);
            prompt.push('\n');
        }

        if research.is_fallback {
            prompt.push_str(
                "\nNote: the research below is background knowledge only and was not \
                 checked against live sources. Do not present specific figures or \
                 claims from it as verified facts.\n",
            );
        } else if !research.sources.is_empty() {
            prompt.push_str("\nSources:\n");
            for source in &research.sources {
                prompt.push_str(&format!("- {source}\n"));
            }
        }

        prompt.push_str("\n--- RESEARCH ---\n");
        prompt.push_str(&research.summary);

        CompletionRequest::new(prompt)
            .system(self.role)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
    }
}

/// Produces drafts through a completion service.
pub struct Generator<'a> {
    completion: &'a dyn TextCompletion,
    policy: RetryPolicy,
}

impl<'a> Generator<'a> {
    pub fn new(completion: &'a dyn TextCompletion, policy: RetryPolicy) -> Self {
        Self { completion, policy }
    }

    /// Generate the draft for `platform`.
    ///
    /// Any failure is wrapped as `ContentForgeError::Generation`.
    #[instrument(skip(self, research), fields(fallback = research.is_fallback))]
    pub async fn generate(
        &self,
        platform: Platform,
        topic: &str,
        research: &ResearchResult,
    ) -> Result<ContentDraft> {
        let profile = PlatformProfile::for_platform(platform);
        let request = profile.request(topic, research);

        let label = format!("generate {platform}");
        let completion =
            execute_with_retry(&self.policy, &label, || self.completion.complete(&request))
                .await
                .map_err(|e| ContentForgeError::generation(platform, e))?;

        let text = completion.text.trim();
        if text.is_empty() {
            return Err(ContentForgeError::generation(
                platform,
                ContentForgeError::parse("model returned empty output"),
            ));
        }

        debug!(
            tokens_in = completion.tokens_in,
            tokens_out = completion.tokens_out,
            latency_ms = completion.latency_ms,
            "completion received"
        );

        let draft = finalize(&profile, text, topic)
            .map_err(|e| ContentForgeError::generation(platform, e))?;
        info!(chars = draft.body.chars().count(), "draft ready");
        Ok(draft)
    }
}

/// Apply the platform's post-processing to raw model output.
fn finalize(profile: &PlatformProfile, text: &str, topic: &str) -> Result<ContentDraft> {
    let platform = profile.platform;

    let mut draft = if platform == Platform::Instagram {
        let (caption, idea) = split_image_idea(text);
        if caption.is_empty() {
            return Err(ContentForgeError::parse("model returned an image idea but no caption"));
        }
        let idea = idea.unwrap_or_else(|| {
            warn!("model omitted the image idea, using placeholder");
            placeholder_image_idea(topic)
        });
        let mut draft = ContentDraft::new(platform, caption);
        draft.extra.insert(IMAGE_IDEA_KEY.to_string(), idea);
        draft
    } else {
        ContentDraft::new(platform, text)
    };

    if let Some(max) = profile.max_chars {
        let original = draft.body.chars().count();
        if original > max {
            warn!(%platform, original, max, "draft over length, truncating");
            draft.body = truncate_chars(&draft.body, max);
        }
    }

    Ok(draft)
}

/// Separate the `IMAGE IDEA:` line from an Instagram caption.
///
/// Matching ignores case and surrounding Markdown emphasis.
fn split_image_idea(text: &str) -> (String, Option<String>) {
    let mut idea = None;
    let mut caption_lines = Vec::new();

    for line in text.lines() {
        let bare = line.trim().trim_start_matches(['*', '_', '#', ' ']);
        let is_idea = idea.is_none()
            && bare
                .get(..IMAGE_IDEA_PREFIX.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(IMAGE_IDEA_PREFIX));

        if is_idea {
            let value = bare[IMAGE_IDEA_PREFIX.len()..]
                .trim()
                .trim_matches(['*', '_'])
                .trim();
            if !value.is_empty() {
                idea = Some(value.to_string());
            }
            continue;
        }
        caption_lines.push(line);
    }

    (caption_lines.join("\n").trim().to_string(), idea)
}

fn placeholder_image_idea(topic: &str) -> String {
    if topic.is_empty() {
        "A bold, high-contrast photo that captures the post's main idea.".to_string()
    } else {
        format!("A bold, high-contrast photo or illustration that captures {topic}.")
    }
}

/// Cut `text` to `max` characters, ending with an ellipsis.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let kept: String = text.chars().take(max - 1).collect();
    let mut out = kept.trim_end().to_string();
    out.push(ELLIPSIS);
    out
}
