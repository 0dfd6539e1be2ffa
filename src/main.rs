//! slack2discord - Import a Slack export into Discord.
//!
//! Reads the JSON day files of a Slack export, converts each message to
//! Discord markdown, downloads attached files, and posts everything in
//! timestamp order with threads recreated as Discord threads.
//!
//! Examples:
//!   slack2discord --src-dirtree export/ --create
//!   slack2discord --src-dir export/general --dest-channel slack-general
//!   slack2discord --src-file export/general/2023-01-22.json --dest-channel test -n

mod application;
mod cli;
mod domain;
mod infrastructure;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{format_summary, Importer};
use cli::Cli;
use domain::TokioSleeper;
use infrastructure::{load_config, DiscordClient, HttpDownloader};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> anyhow::Result<()> {
    let app = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let config = cli.import_config(&app)?;
    let token = cli.discord_token()?;

    if config.dry_run {
        tracing::warn!("Dry run: nothing will be changed in Discord");
    }

    let discord = DiscordClient::connect(&app.discord.api_base, token, cli.server(&app))
        .await
        .context("Failed to connect to Discord")?;
    let downloader = HttpDownloader::new(cli.slack_token.clone());

    let summary = Importer::new(&config, &discord, &TokioSleeper)
        .run(downloader)
        .await?;

    println!("{}", format_summary(&summary));
    summary.finish()?;

    Ok(())
}

/// Setup tracing subscriber for logging.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
