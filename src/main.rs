//! Chain-Sweep main entry point
//!
//! This is the command-line interface for crawling the complete history of an
//! address from an Etherscan-compatible API.

use anyhow::{bail, Context};
use chain_sweep::config::{load_config_with_hash, Config};
use chain_sweep::output::export_results;
use chain_sweep::{JobParams, JobStatus, JobSupervisor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Chain-Sweep: complete address history from a capped indexing API
///
/// Chain-Sweep splits the block range into adaptively sized segments so that
/// no query exceeds the provider's record cap, deduplicates everything it
/// fetches and tracks exactly which blocks are covered.
#[derive(Parser, Debug)]
#[command(name = "chain-sweep")]
#[command(version = "1.0.0")]
#[command(about = "Complete address history from a capped indexing API", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    /// Validate config and print it without contacting the API
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl every transaction of an address from a start block to the chain head
    Crawl {
        /// Address to crawl (0x + 40 hex characters)
        #[arg(long)]
        address: String,

        /// First block to include
        #[arg(long, default_value_t = 0)]
        start_block: u64,

        /// Also fetch ERC-20 token transfers
        #[arg(long)]
        include_tokens: bool,

        /// Records per page (clamped to the provider maximum)
        #[arg(long)]
        page_size: Option<u32>,

        /// Stop after this many pages; the job can be resumed later
        #[arg(long)]
        max_pages: Option<u64>,

        /// Directory for the CSV exports
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Seconds between progress reports
        #[arg(long, default_value_t = 10)]
        progress_secs: u64,
    },

    /// Print the native balance of an address at 00:00 UTC on a date
    Balance {
        #[arg(long)]
        address: String,

        /// Date as YYYY-MM-DD
        #[arg(long)]
        date: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    match cli.command {
        Some(Command::Crawl {
            address,
            start_block,
            include_tokens,
            page_size,
            max_pages,
            output_dir,
            progress_secs,
        }) => {
            let params = JobParams {
                id: None,
                address,
                start_block,
                include_tokens,
                page_size,
                max_pages,
            };
            handle_crawl(&config, params, output_dir, Duration::from_secs(progress_secs.max(1))).await
        }
        Some(Command::Balance { address, date }) => handle_balance(&config, &address, &date).await,
        None => bail!("no command given; use `crawl`, `balance` or --dry-run"),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("chain_sweep=info,warn"),
            1 => EnvFilter::new("chain_sweep=debug,info"),
            2 => EnvFilter::new("chain_sweep=trace,debug"),
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

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Chain-Sweep Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Chain ID: {}", config.api.chain_id);
    println!(
        "  API key: {}",
        if config.api.resolved_api_key().is_empty() {
            "(none)"
        } else {
            "(set)"
        }
    );
    println!("  Timeout: {}s", config.api.timeout_secs);

    println!("\nSegmentation:");
    println!(
        "  Window: {} blocks (min {}, max {})",
        config.crawl.default_window, config.crawl.min_window, config.crawl.max_window
    );
    println!(
        "  Growth: x{} after {} cap-free segments",
        config.crawl.grow_factor, config.crawl.grow_after
    );
    println!("  Record cap: {}", config.crawl.max_records_per_query);
    println!("  Default page size: {}", config.crawl.default_page_size);

    println!("\nRetry:");
    println!("  Attempts: {}", config.retry.max_attempts);
    println!(
        "  Delay: {}ms doubling up to {}ms (jitter {})",
        config.retry.base_delay_ms, config.retry.max_delay_ms, config.retry.jitter
    );

    println!("\nJobs:");
    println!("  Retained: {}", config.jobs.max_retained);

    println!("\n✓ Configuration is valid");
}

/// Runs one crawl job in the foreground, exporting whatever it collected
async fn handle_crawl(
    config: &Config,
    params: JobParams,
    output_dir: PathBuf,
    progress_every: Duration,
) -> anyhow::Result<()> {
    let supervisor = JobSupervisor::with_etherscan(config);
    let id = supervisor.start(params)?;

    let wait = supervisor.wait(&id);
    tokio::pin!(wait);
    let mut ticker = tokio::time::interval(progress_every);
    ticker.tick().await;
    let mut pause_sent = false;

    let snapshot = loop {
        tokio::select! {
            snapshot = &mut wait => break snapshot?,
            _ = ticker.tick() => {
                let status = supervisor.status(&id)?;
                tracing::info!(
                    coverage_end = ?status.coverage_end,
                    latest_block = ?status.latest_block,
                    window = ?status.window,
                    transactions = status.transactions,
                    token_transfers = status.token_transfers,
                    pages = status.pages_processed,
                    "Progress"
                );
            }
            result = tokio::signal::ctrl_c(), if !pause_sent => {
                result.context("failed to listen for Ctrl-C")?;
                tracing::warn!("Interrupt received; pausing after the current page");
                supervisor.pause(&id)?;
                pause_sent = true;
            }
        }
    };

    let results = supervisor.results(&id)?;
    let files = export_results(&output_dir, &snapshot, &results)?;

    println!("\n=== Crawl {} ===", snapshot.status);
    println!("Address: {}", snapshot.address);
    println!(
        "Coverage: {} -> {} (latest {})",
        snapshot.start_block,
        snapshot
            .coverage_end
            .map_or_else(|| "none".to_string(), |b| b.to_string()),
        snapshot
            .latest_block
            .map_or_else(|| "unknown".to_string(), |b| b.to_string())
    );
    println!("Transactions: {}", snapshot.transactions);
    if snapshot.include_tokens {
        println!("Token transfers: {}", snapshot.token_transfers);
    }
    println!("Pages: {}", snapshot.pages_processed);
    if let Some(reason) = &snapshot.high_activity {
        println!("High activity: {}", reason);
    }
    if !snapshot.truncated_blocks.is_empty() {
        println!(
            "Blocks over the record cap (partial data): {:?}",
            snapshot.truncated_blocks
        );
    }
    println!("Wrote {}", files.transactions.display());
    if let Some(path) = &files.token_transfers {
        println!("Wrote {}", path.display());
    }

    match snapshot.status {
        JobStatus::Failed => bail!(
            "crawl failed: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
        JobStatus::Paused if snapshot.limit_reached => {
            println!(
                "Stopped at the page limit; continue with --start-block {}",
                snapshot.coverage_end.map_or(snapshot.start_block, |b| b + 1)
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn handle_balance(config: &Config, address: &str, date: &str) -> anyhow::Result<()> {
    let supervisor = JobSupervisor::with_etherscan(config);
    let balance = supervisor.balance_at_date(address, date).await?;

    println!("Address: {}", balance.address);
    println!("Date: {} 00:00 UTC", balance.date);
    println!("Block: {}", balance.block_number);
    println!("Balance: {} ETH ({} wei)", balance.balance_eth(), balance.balance_wei);

    Ok(())
}
