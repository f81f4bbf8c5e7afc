//! Application configuration for ContentForge.
//!
//! User config lives at `~/.contentforge/contentforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ContentForgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contentforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contentforge";

// ---------------------------------------------------------------------------
// Config structs (matching contentforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Text-completion service settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retry policy for every external call.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Research step settings.
    #[serde(default)]
    pub research: ResearchConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory receiving the run record and blog document.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Fan the four generation calls out concurrently.
    #[serde(default)]
    pub parallel_generation: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            parallel_generation: false,
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// HTTP timeout for one completion request.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "google/gemini-2.0-flash-001".into()
}
fn default_llm_timeout() -> u64 {
    60
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total tries per external call, first attempt included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles for each further retry.
    /// Zero or negative means retry immediately.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: i64,

    /// Upper bound for a single attempt; 0 disables the bound.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl RetryConfig {
    /// Base delay with negative values clamped to zero.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms.max(0) as u64)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs))
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> i64 {
    5_000
}
fn default_call_timeout() -> u64 {
    90
}

/// `[research]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Characters of fetched page text sent to the summarizer per source.
    #[serde(default = "default_max_source_chars")]
    pub max_source_chars: usize,

    /// Use live web search when no reference URLs are given.
    #[serde(default)]
    pub search_enabled: bool,

    /// Name of the env var holding the search API key.
    #[serde(default = "default_search_api_key_env")]
    pub search_api_key_env: String,

    /// Number of search hits to research.
    #[serde(default = "default_search_results")]
    pub search_results: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_source_chars: default_max_source_chars(),
            search_enabled: false,
            search_api_key_env: default_search_api_key_env(),
            search_results: default_search_results(),
        }
    }
}

fn default_max_source_chars() -> usize {
    12_000
}
fn default_search_api_key_env() -> String {
    "SERPER_API_KEY".into()
}
fn default_search_results() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contentforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ContentForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contentforge/contentforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ContentForgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ContentForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ContentForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ContentForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ContentForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the named env var, failing if unset or empty.
pub fn resolve_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(ContentForgeError::config(format!(
            "API key not found. Set the {var_name} environment variable \
             (or add it to a .env file in the working directory)."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("max_attempts"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.retry.max_attempts, 3);
        assert_eq!(parsed.llm.api_key_env, "OPENROUTER_API_KEY");
        assert!(!parsed.research.search_enabled);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/drafts"

[retry]
base_delay_ms = -250
call_timeout_secs = 0
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir, "/tmp/drafts");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay(), Duration::ZERO);
        assert_eq!(config.retry.call_timeout(), None);
        assert_eq!(config.llm.timeout_secs, 60);
    }

    #[test]
    fn api_key_resolution() {
        // Use a unique env var name to avoid interfering with other tests
        let result = resolve_api_key("CF_TEST_NONEXISTENT_KEY_12345");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
