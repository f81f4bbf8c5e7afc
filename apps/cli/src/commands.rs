//! CLI command definitions, routing, and tracing setup.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use contentforge_core::{
    ProgressReporter, RunOutcome, RunState, Workflow, WorkflowConfig, load_run,
};
use contentforge_llm::OpenAiCompatClient;
use contentforge_shared::{
    AppConfig, IMAGE_IDEA_KEY, Platform, RunRequest, RunResult, init_config, load_config,
    resolve_api_key,
};
use contentforge_web::{HttpFetcher, SerperSearch};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ContentForge: research a topic and draft content for every platform.
#[derive(Parser)]
#[command(
    name = "contentforge",
    version,
    about = "Research a topic and draft a blog post, LinkedIn post, tweet, and Instagram caption.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also append ERROR-level events to this file.
    #[arg(long, env = "CONTENTFORGE_ERROR_LOG", global = true)]
    pub error_log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Research a topic and generate content for all platforms.
    Run {
        /// Topic to write about (optional when --url is given).
        topic: Option<String>,

        /// Reference URL to research (repeatable).
        #[arg(short, long = "url")]
        urls: Vec<String>,

        /// Output directory (defaults to the configured output_dir).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Generate the four drafts concurrently.
        #[arg(long)]
        parallel: bool,

        /// Model identifier override.
        #[arg(long)]
        model: Option<String>,
    },

    /// Print a saved run record.
    Show {
        /// Path to a `social_content_*.json` record.
        record: PathBuf,

        /// Print the raw JSON record instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer, fmt};

    let filter = match cli.verbose {
        0 => "contentforge=info",
        1 => "contentforge=debug",
        _ => "contentforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let console = match cli.log_format {
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
    };

    let error_file = match &cli.error_log {
        Some(path) => Some(error_file_layer(open_error_log(path)?)),
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(error_file)
        .init();
    Ok(())
}

/// Open (or create) the error log for appending.
fn open_error_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| eyre!("cannot create error log directory {}: {e}", parent.display()))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| eyre!("cannot open error log {}: {e}", path.display()))
}

/// Plain-text layer that only lets ERROR events through.
fn error_file_layer<S>(file: File) -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    use tracing_subscriber::Layer;
    use tracing_subscriber::filter::LevelFilter;

    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::ERROR)
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            topic,
            urls,
            out,
            parallel,
            model,
        } => cmd_run(topic, urls, out, parallel, model).await,
        Command::Show { record, json } => cmd_show(&record, json),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    topic: Option<String>,
    urls: Vec<String>,
    out: Option<PathBuf>,
    parallel: bool,
    model: Option<String>,
) -> Result<()> {
    let mut config = load_config()?;
    if let Some(model) = model {
        config.llm.model = model;
    }
    if parallel {
        config.defaults.parallel_generation = true;
    }

    // Fail on bad input before asking for credentials.
    let request = RunRequest::new(topic.unwrap_or_default()).with_urls(urls);
    request.validate()?;

    let workflow = build_workflow(&config, out)?;

    info!(
        topic = %request.topic(),
        urls = request.reference_urls.len(),
        model = %config.llm.model,
        parallel = workflow.config().parallel_generation,
        "starting content run"
    );

    let reporter = CliProgress::new();
    let outcome = workflow.run(request, &reporter).await;
    reporter.finish();

    let RunOutcome { result, persisted } = outcome?;
    print_result(&result);

    match persisted {
        Ok(files) => {
            println!("  Saved:");
            println!("    record:   {}", files.record_path.display());
            if let Some(doc) = &files.document_path {
                println!("    document: {}", doc.display());
            }
            println!();
            Ok(())
        }
        Err(e) => Err(eyre!("content was generated but could not be saved: {e}")),
    }
}

/// Wire the configured collaborators into a workflow.
fn build_workflow(config: &AppConfig, out: Option<PathBuf>) -> Result<Workflow> {
    let api_key = resolve_api_key(&config.llm.api_key_env)?;
    let completion = OpenAiCompatClient::new(
        api_key,
        &config.llm.base_url,
        &config.llm.model,
        Duration::from_secs(config.llm.timeout_secs),
    )?;
    let fetcher = HttpFetcher::new()?;

    let mut workflow_config = WorkflowConfig::from(config);
    if let Some(out) = out {
        workflow_config = workflow_config.with_output_dir(out);
    }

    let mut workflow = Workflow::new(workflow_config, Arc::new(completion), Arc::new(fetcher));

    if config.research.search_enabled {
        match resolve_api_key(&config.research.search_api_key_env) {
            Ok(key) => workflow = workflow.with_search(Arc::new(SerperSearch::new(key)?)),
            Err(e) => warn!(error = %e, "search enabled but no key found, continuing without it"),
        }
    }

    Ok(workflow)
}

fn cmd_show(record: &Path, json: bool) -> Result<()> {
    let result = load_run(record)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_result(result: &RunResult) {
    let topic = match result.request.topic() {
        "" => "(from reference URLs)",
        t => t,
    };

    println!();
    println!("  Run:       {}", result.run_id);
    println!("  Topic:     {topic}");
    println!("  Generated: {}", result.generated_at.to_rfc3339());
    if result.research.is_fallback {
        println!("  Research:  background knowledge only (no sources retrieved)");
    } else {
        println!("  Research:  {} source(s)", result.research.sources.len());
    }
    for skipped in &result.research.skipped {
        println!("    skipped {}: {}", skipped.url, skipped.reason);
    }

    for platform in Platform::ALL {
        println!();
        match result.draft(platform) {
            Some(draft) => {
                println!("  === {} ===", platform.label());
                println!();
                for line in draft.body.lines() {
                    println!("  {line}");
                }
                if let Some(idea) = draft.extra.get(IMAGE_IDEA_KEY) {
                    println!();
                    println!("  Image idea: {idea}");
                }
            }
            None => {
                let reason = result
                    .failures
                    .iter()
                    .find(|f| f.platform == platform)
                    .map(|f| f.error.as_str())
                    .unwrap_or("not generated");
                println!("  === {} (failed) ===", platform.label());
                println!("  {reason}");
            }
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar over the four platforms.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(Platform::ALL.len() as u64);
        let style = ProgressStyle::with_template("{spinner:.cyan} [{bar:20.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .progress_chars("=> ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn state(&self, state: RunState) {
        let message = match state {
            RunState::Pending => "Starting".to_string(),
            RunState::Researching => "Researching".to_string(),
            RunState::Generating(k) => format!(
                "Generating {}",
                Platform::ALL
                    .get(k.saturating_sub(1))
                    .map(|p| p.label())
                    .unwrap_or("drafts")
            ),
            RunState::Persisting => "Saving".to_string(),
            RunState::Done => "Done".to_string(),
            RunState::Failed => "Failed".to_string(),
        };
        self.bar.set_message(message);
    }

    fn fraction(&self, completed: f64) {
        let total = Platform::ALL.len() as f64;
        self.bar.set_position((completed * total).round() as u64);
    }

    fn platform_finished(&self, platform: Platform, ok: bool) {
        if !ok {
            self.bar
                .println(format!("  ! {} draft failed", platform.label()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cf-cli-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn error_log_keeps_only_errors() {
        let tmp = temp_dir();
        let path = tmp.join("logs").join("errors.log");

        let subscriber =
            tracing_subscriber::registry().with(error_file_layer(open_error_log(&path).unwrap()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("retrying slow call");
            tracing::error!(platform = "twitter", "draft failed");
        });

        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.contains("draft failed"));
        assert!(log.contains("twitter"));
        assert!(!log.contains("retrying slow call"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn error_log_appends() {
        let tmp = temp_dir();
        let path = tmp.join("errors.log");
        std::fs::write(&path, "earlier line\n").unwrap();

        let subscriber =
            tracing_subscriber::registry().with(error_file_layer(open_error_log(&path).unwrap()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("second run failed");
        });

        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.starts_with("earlier line\n"));
        assert!(log.contains("second run failed"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn error_log_flag_parses() {
        let cli = Cli::parse_from(["contentforge", "--error-log", "/tmp/cf.log", "config", "show"]);
        assert_eq!(cli.error_log, Some(PathBuf::from("/tmp/cf.log")));
    }
}
