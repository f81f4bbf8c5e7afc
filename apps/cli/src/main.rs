//! ContentForge CLI: research a topic and draft content for four platforms.
//!
//! Produces a blog post, a LinkedIn post, a tweet, and an Instagram caption
//! from a topic and/or reference URLs, and saves them under the output
//! directory.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // A missing .env file is fine; keys may come from the real environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli)?;
    commands::run(cli).await
}
