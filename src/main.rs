//! group-graph main entry point
//!
//! This is the command-line interface for the group membership graph crawler.

use anyhow::Context;
use clap::Parser;
use group_graph::config::{load_config_with_hash, Config};
use group_graph::crawler::{run_crawl, CrawlSummary};
use group_graph::logging::setup_logging;
use group_graph::output::{load_statistics, print_statistics};
use group_graph::storage::FileStorage;
use std::path::PathBuf;

/// group-graph: a resumable crawler for a group's membership graph
///
/// Enumerates the members of a group, fetches their profiles, records the
/// friendships between members and the groups every member belongs to.
/// Progress is saved after every batch; rerunning resumes where the last
/// run stopped.
#[derive(Parser, Debug)]
#[command(name = "group-graph")]
#[command(version)]
#[command(about = "A resumable crawler for a group's membership graph", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without calling the API
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show progress statistics from the data directory and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Configuration comes first: the log sinks are part of it
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let logging = setup_logging(cli.verbose, cli.quiet, &config.logging, &config.api)
        .context("failed to set up logging")?;

    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );

    let result = if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&config, &config_hash).await
    };

    logging.shutdown().await;
    result
}

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== group-graph Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Version: {}", config.api.version);
    println!("  Request interval: {}ms", config.api.request_interval);

    println!("\nCrawl:");
    println!("  Group id: {}", config.crawl.group_id);
    println!("  Data directory: {}", config.crawl.data_dir.display());

    println!("\nLogging:");
    if config.logging.file.enabled {
        println!("  File: {}", config.logging.file.path.display());
    } else {
        println!("  File: disabled");
    }
    if config.logging.alert.enabled {
        println!("  Alerts: to user {}", config.logging.alert.user_id);
    } else {
        println!("  Alerts: disabled");
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would crawl group {} into {}",
        config.crawl.group_id,
        config.crawl.data_dir.display()
    );

    Ok(())
}

/// Handles the --stats mode: shows progress from the persisted tables
///
/// Read-only: a missing data directory or table counts as empty.
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let storage = FileStorage::inspect(&config.crawl.data_dir);
    println!("Data directory: {}\n", storage.data_dir().display());

    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Starting crawl of group {} (data in {})",
        config.crawl.group_id,
        config.crawl.data_dir.display()
    );

    match run_crawl(config, config_hash).await {
        Ok(summary) => {
            report(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

fn report(summary: &CrawlSummary) {
    tracing::info!("Enumeration: {}", summary.enumeration);
    tracing::info!("Profiles: {}", summary.profiles);
    tracing::info!("Connections: {}", summary.connections);
    tracing::info!("Groups: {}", summary.groups);

    if summary.any_halted() {
        tracing::info!("Crawl paused on API quota; run again later to continue");
    } else {
        tracing::info!("Crawl completed successfully");
    }
}
