//! rceth-harvest main entry point
//!
//! This is the command-line interface for the drug-registry harvester.

use clap::Parser;
use rceth_harvest::config::{load_config_with_hash, Config};
use rceth_harvest::crawler::{crawl, partition_seeds};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// rceth-harvest: a drug-registry catalog harvester
///
/// Enumerates every registered drug through the registry search form,
/// stores one record per drug and fingerprints the attached documents
/// by sampling byte ranges.
#[derive(Parser, Debug)]
#[command(name = "rceth-harvest")]
#[command(version)]
#[command(about = "A drug-registry catalog harvester", long_about = None)]
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

    /// Validate config and show the seed order without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("rceth_harvest=info,warn"),
            1 => EnvFilter::new("rceth_harvest=debug,info"),
            2 => EnvFilter::new("rceth_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the seed order
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== rceth-harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!(
        "  Chain stall timeout: {}s",
        config.crawler.chain_stall_timeout_secs
    );
    println!("  Max retries: {}", config.crawler.max_retries);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nSite:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Results path: {}", config.site.results_path);
    println!("  Page size: {}", config.site.page_size);

    println!("\nFingerprinting:");
    println!("  Window size: {} bytes", config.fingerprint.window_size);
    println!("  Sample count: {}", config.fingerprint.sample_count);
    println!("  Accept-Encoding: {}", config.fingerprint.accept_encoding);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Discard items: {}", config.output.discard_items);

    let seeds = partition_seeds(&mut rand::thread_rng(), config.crawler.seeds.as_deref());
    println!("\nSeed order ({}):", seeds.len());
    println!("  {}", seeds.iter().collect::<String>());

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seeds", seeds.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use rceth_harvest::output::{load_statistics, print_statistics};
    use rceth_harvest::storage::SqliteStorage;
    use std::path::Path;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str) -> Result<(), Box<dyn std::error::Error>> {
    match &config.crawler.seeds {
        Some(subset) => tracing::info!("Crawling seed subset: {}", subset),
        None => tracing::info!("Crawling the full seed alphabet"),
    }

    match crawl(config, config_hash).await {
        Ok(report) if report.is_complete() => {
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
        Ok(_) => {
            tracing::warn!("Crawl finished incomplete");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
