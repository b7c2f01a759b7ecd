//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest pipeline.

use anyhow::Context;
use catalog_harvest::config::{load_config_with_hash, validate, Config};
use catalog_harvest::crawler::harvest;
use catalog_harvest::output::{load_statistics, print_run_summary, print_statistics};
use catalog_harvest::storage::{is_postgres_dsn, open_sink};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a supervised crawl-extract-persist pipeline
///
/// Catalog-Harvest walks catalog categories and paginated listings, fetches
/// every item page with a supervised worker pool and upserts one record per
/// item into SQLite or Postgres.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A supervised catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply without one)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Category page URL to start from (repeatable, replaces configured seeds)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Number of worker units
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Postgres DSN or SQLite path
    #[arg(long, value_name = "DSN")]
    dsn: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show record counts from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {:#}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config).await?;
    } else {
        handle_harvest(config).await?;
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
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
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

/// Loads the config file (if any) and applies command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("reading {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    if !cli.seeds.is_empty() {
        config.crawl.seeds = cli.seeds.clone();
    }
    if let Some(workers) = cli.workers {
        config.pipeline.workers = workers;
    }
    if let Some(dsn) = &cli.dsn {
        config.storage.dsn = dsn.clone();
    }

    validate(&config).context("invalid configuration after command-line overrides")?;
    Ok(config)
}

/// Describes where records go without leaking Postgres credentials
fn describe_storage(dsn: &str) -> String {
    if is_postgres_dsn(dsn) {
        match url::Url::parse(dsn) {
            Ok(parsed) => format!(
                "postgres at {}{}",
                parsed.host_str().unwrap_or("localhost"),
                parsed.path()
            ),
            Err(_) => "postgres".to_string(),
        }
    } else {
        format!("sqlite at {}", dsn)
    }
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) {
    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Pipeline:");
    println!("  Workers: {}", config.pipeline.workers);
    println!("  Discovery: {:?}", config.crawl.discovery);
    println!("  Poll interval: {}ms", config.pipeline.poll_interval_ms);
    println!("  Quiescence polls: {}", config.pipeline.quiescence_polls);
    if config.pipeline.max_task_attempts == 0 {
        println!("  Max task attempts: unbounded");
    } else {
        println!("  Max task attempts: {}", config.pipeline.max_task_attempts);
    }

    println!("\nWriter:");
    println!("  Batch size: {}", config.writer.batch_size);
    println!("  Idle flush: {}ms", config.writer.idle_flush_ms);
    println!("  Storage: {}", describe_storage(&config.storage.dsn));

    println!("\nFetcher:");
    println!("  Timeout: {}s", config.fetcher.timeout_secs);
    println!("  Retries: {}", config.fetcher.retries);
    println!("  User agents: {}", config.fetcher.user_agents.len());

    println!("\nSeeds ({}):", config.crawl.seeds.len());
    for seed in &config.crawl.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start harvesting from {} seed URLs",
        config.crawl.seeds.len()
    );
}

/// Handles the --stats mode: shows record counts from the database
async fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Storage: {}\n", describe_storage(&config.storage.dsn));

    let mut sink = open_sink(&config.storage)
        .await
        .context("opening storage")?;
    let stats = load_statistics(sink.as_mut())
        .await
        .context("loading statistics")?;

    print_statistics(&stats);
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config) -> anyhow::Result<()> {
    if config.crawl.seeds.is_empty() {
        tracing::warn!("No seed URLs configured; nothing will be discovered");
    }
    tracing::info!(
        "Harvesting {} seeds with {} workers into {}",
        config.crawl.seeds.len(),
        config.pipeline.workers,
        describe_storage(&config.storage.dsn)
    );

    // Ctrl-C drains the pipeline instead of killing it
    let interrupt = CancellationToken::new();
    let on_signal = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl-C, finishing in-flight work");
            on_signal.cancel();
        }
    });

    match harvest(config, interrupt).await {
        Ok(summary) => {
            tracing::info!("Harvest completed successfully");
            print_run_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e).context("harvest failed")
        }
    }
}
