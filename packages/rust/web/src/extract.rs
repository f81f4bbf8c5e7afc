//! HTML-to-text extraction for research prompts.
//!
//! Picks the main content container, strips page chrome, converts the rest to
//! Markdown with `htmd`, then runs a couple of cleanup passes so the
//! summarizer sees prose rather than markup.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use contentforge_shared::{ContentForgeError, Result};

/// Tags never worth sending to the model.
const SKIP_TAGS: [&str; 11] = [
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg", "form",
    "button",
];

/// Convert an HTML document into readable text.
pub fn extract_text(html: &str) -> Result<String> {
    let content_html = extract_content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let markdown = converter
        .convert(&content_html)
        .map_err(|e| ContentForgeError::parse(format!("htmd conversion failed: {e}")))?;

    let cleaned = normalize_whitespace(&strip_leftover_html(&markdown));
    debug!(html_len = html.len(), text_len = cleaned.len(), "extracted page text");
    Ok(cleaned)
}

/// Pass plain text and Markdown through with whitespace normalized.
pub fn normalize_plain(text: &str) -> String {
    normalize_whitespace(text)
}

/// Extract the main content HTML, falling back to `<body>`.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    let selectors = ["article", "main", "[role=\"main\"]", ".post-content", ".content"];

    for sel_str in &selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            return body.inner_html();
        }
    }

    html.to_string()
}

/// Drop any tags htmd passed through verbatim.
fn strip_leftover_html(md: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("valid regex"));

    TAG_RE.replace_all(md, "").to_string()
}

/// Trim trailing spaces and collapse runs of blank lines into one.
fn normalize_whitespace(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let trimmed: Vec<&str> = text.lines().map(str::trim_end).collect();
    MULTI_BLANK_RE
        .replace_all(&trimmed.join("\n"), "\n\n")
        .trim()
        .to_string()
}
