//! followback - Follow back your Bluesky followers

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use libfollowback::graph::bluesky::BlueskyClient;
use libfollowback::logging::LoggingConfig;
use libfollowback::{Config, Credentials, FollowBack, FollowbackError, Result, RunStats};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "followback")]
#[command(version)]
#[command(about = "Follow back every Bluesky account that follows you")]
#[command(long_about = "\
followback - Follow back your Bluesky followers

DESCRIPTION:
    followback logs in to a Bluesky account, collects everyone who follows
    it and everyone it already follows, and then follows each follower that
    is not yet followed back.

    Every request is retried with exponential backoff. When the service
    reports rate limiting, followback waits 15 minutes and tries again
    without counting that against the retry limit.

USAGE:
    # Follow back using credentials from the environment
    BSKY_USERNAME=me.bsky.social BSKY_PASSWORD=app-password followback

    # See who would be followed, without following anyone
    followback --dry-run

    # Machine-readable report
    followback --format json

CONFIGURATION:
    Configuration file: ~/.config/followback/config.toml
    (override with --config or FOLLOWBACK_CONFIG)

    [service]
    url = \"https://bsky.social\"

    [sync]
    page_limit = 100   # accounts per listing page
    delay_ms = 1000    # pause after each page and each follow

    [retry]
    max_retries = 3
    backoff_base_ms = 1000
    backoff_cap_ms = 10000
    rate_limit_pause_secs = 900

ENVIRONMENT:
    BSKY_USERNAME          Account handle or email
    BSKY_PASSWORD          Account password (an app password is recommended)
                           Both are read from the process environment only;
                           a .env file is not loaded.
    FOLLOWBACK_CONFIG      Path to the configuration file
    FOLLOWBACK_LOG_FORMAT  text, json, or pretty
    FOLLOWBACK_LOG_LEVEL   error, warn, info, debug, or trace

EXIT CODES:
    0 - Run completed (individual follow failures are reported, not fatal)
    1 - Fatal service error (login, profile lookup, or listing failed)
    2 - Configuration error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Service URL (overrides config)
    #[arg(long, value_name = "URL")]
    service: Option<String>,

    /// Attempts per request before giving up (overrides config)
    #[arg(long, value_name = "COUNT")]
    max_retries: Option<u32>,

    /// Pause after each page and each follow, in milliseconds (overrides config)
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Report who would be followed without following anyone
    #[arg(long)]
    dry_run: bool,

    /// Output format for the final report
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    match run(&cli).await {
        Ok(stats) => {
            if let Err(e) = print_report(&stats, cli.format) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            report_fatal(&e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: &Cli) -> Result<RunStats> {
    let config = load_config(cli)?;

    let credentials = Credentials::from_env();
    let client = BlueskyClient::new(&config.service.url)?;
    let mut sync = FollowBack::from_config(&client, &config);

    sync.run(&credentials).await.map_err(|e| {
        error!("Run aborted while {}", sync.phase());
        e
    })
}

/// Load the config file and apply command-line overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    if let Some(url) = &cli.service {
        config.service.url = url.clone();
    }
    if let Some(max_retries) = cli.max_retries {
        config.retry.max_retries = max_retries;
    }
    if let Some(delay_ms) = cli.delay_ms {
        config.sync.delay_ms = delay_ms;
    }
    if cli.dry_run {
        config.sync.dry_run = true;
    }

    config.validate()?;
    Ok(config)
}

fn print_report(stats: &RunStats, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(stats)?);
        }
        OutputFormat::Text => {
            println!("Final Statistics:");
            if stats.dry_run {
                println!("  Would follow {} new accounts", stats.followed);
            } else {
                println!("  Successfully followed {} new accounts", stats.followed);
            }
            println!("  Skipped {} already-followed accounts", stats.skipped);
            if stats.failed > 0 {
                println!("  Failed to follow {} accounts", stats.failed);
            }
            println!("  Total followers processed: {}", stats.total);
        }
    }
    Ok(())
}

fn report_fatal(e: &FollowbackError) {
    eprintln!("Fatal error: {}", e);
    if let Some(status) = e.status() {
        eprintln!("Status code: {}", status);
    }
    eprintln!("Details: {:?}", e);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_apply_over_config_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[retry]\nmax_retries = 7\n\n[sync]\ndelay_ms = 300\n").unwrap();

        let cli = Cli::parse_from([
            "followback",
            "--config",
            path.to_str().unwrap(),
            "--service",
            "https://pds.example.com",
            "--delay-ms",
            "0",
            "--dry-run",
        ]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.service.url, "https://pds.example.com");
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.sync.delay_ms, 0);
        assert!(config.sync.dry_run);
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let cli = Cli::parse_from([
            "followback",
            "--config",
            path.to_str().unwrap(),
            "--service",
            "",
        ]);
        let error = load_config(&cli).unwrap_err();

        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_json_format_flag() {
        let cli = Cli::parse_from(["followback", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
