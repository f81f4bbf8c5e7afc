//! Web research collaborators: page fetching, text extraction, web search.
//!
//! This crate provides:
//! - [`WebFetcher`] / [`HttpFetcher`]: fetch a URL and return readable text
//! - [`extract`]: HTML → clean Markdown-ish text for prompting
//! - [`WebSearch`] / [`SerperSearch`]: optional live search for a topic

pub mod extract;
pub mod fetch;
pub mod search;

pub use extract::extract_text;
pub use fetch::{HttpFetcher, WebFetcher};
pub use search::{SerperSearch, WebSearch};
