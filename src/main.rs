//! Cluster-Sweep main entry point
//!
//! This is the command-line interface for the Cluster-Sweep crawler.

use chrono::Utc;
use clap::Parser;
use cluster_sweep::config::{load_config_with_hash, Config};
use cluster_sweep::crawler::{cancel_pair, Crawler};
use cluster_sweep::output::{open_sinks, write_all, RunInfo};
use cluster_sweep::CrawlError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Cluster-Sweep: an exhaustive crawler for spatial-clustering map APIs
///
/// Cluster-Sweep expands a hierarchical cluster API from a set of root
/// clusters until every leaf marker is known, then fetches the detail
/// document of each leaf. Failed requests are retried until they succeed.
#[derive(Parser, Debug)]
#[command(name = "cluster-sweep")]
#[command(version = "1.0.0")]
#[command(about = "An exhaustive crawler for spatial-clustering map APIs", long_about = None)]
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

    /// Validate config and show what would be crawled without any network access
    #[arg(long)]
    dry_run: bool,

    /// Write the JSON result here instead of the configured path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(output) = &cli.output {
        config.output.json_path = output.display().to_string();
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else {
        handle_crawl(config, config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("cluster_sweep=info,warn"),
            1 => EnvFilter::new("cluster_sweep=debug,info"),
            2 => EnvFilter::new("cluster_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config) {
    println!("=== Cluster-Sweep Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Concurrency limit: {}", config.crawler.concurrency_limit);
    println!("  Retry delay: {}ms", config.crawler.retry_delay);
    println!("  Request timeout: {}s", config.crawler.request_timeout);
    match config.crawler.max_attempts() {
        Some(max) => println!("  Max attempts: {}", max),
        None => println!("  Max attempts: unlimited"),
    }

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.value);

    println!("\nEndpoints:");
    println!("  Cluster: {}", config.endpoints.cluster);
    println!("  Detail: {}", config.endpoints.detail);
    println!(
        "  Cluster success statuses: {:?}",
        config.endpoints.cluster_success_statuses
    );

    println!("\nProxies ({}, policy {:?}):", config.proxy.pool.len(), config.proxy.policy);
    for proxy in &config.proxy.pool {
        let auth = if proxy.credentials().is_some() { " (authenticated)" } else { "" };
        let usable = if proxy.is_usable() { "" } else { " [unusable]" };
        println!("  - {}{}{}", proxy, auth, usable);
    }

    println!("\nOutput:");
    println!("  JSON: {}", config.output.json_path);
    if let Some(database_path) = &config.output.database_path {
        println!("  Database: {}", database_path);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start expanding from {} root clusters",
        config.seed.root_keys.len()
    );
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Root clusters: {}, proxies: {}, concurrency: {}",
        config.seed.root_keys.len(),
        config.proxy.pool.len(),
        config.crawler.concurrency_limit
    );

    // Open sinks first so a bad output path fails before any request is made
    let mut sinks = open_sinks(&config.output)?;

    let (cancel_handle, cancel_signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight requests");
            cancel_handle.cancel();
        }
    });

    let started_at = Utc::now();
    let crawler = Crawler::new(&config)?.with_cancel_signal(cancel_signal);

    let snapshot = match crawler.run().await {
        Ok(snapshot) => snapshot,
        Err(CrawlError::Cancelled) => {
            tracing::warn!(
                "Crawl cancelled after {} documents; no output written",
                crawler.aggregator().document_count()
            );
            return Err(CrawlError::Cancelled.into());
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    let run = RunInfo {
        config_hash,
        started_at,
        finished_at: Utc::now(),
    };
    write_all(&mut sinks, &snapshot, &run)?;

    tracing::info!(
        "Crawl completed successfully in {}s",
        run.duration_seconds()
    );
    Ok(())
}
