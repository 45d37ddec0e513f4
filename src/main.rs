//! Price-Sync main entry point
//!
//! This is the command-line interface for the Price-Sync engine. Every
//! subcommand is one trigger: schedulers call `run` periodically, people call
//! `run --manual`, `sync`, `abort` and friends.

use anyhow::Context;
use clap::{Parser, Subcommand};
use price_sync::config::{load_catalog, load_config, Config};
use price_sync::output::{load_statistics, print_statistics, EventLog};
use price_sync::storage::{open_storage, ProductStore, SqliteStorage, SyncLog};
use price_sync::sync::{BatchCoordinator, HttpFetcher, InvocationResult, SyncExecutor};
use price_sync::{StatusSnapshot, TriggerKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Price-Sync: keeps catalog prices in step with supplier pages
#[derive(Parser, Debug)]
#[command(name = "price-sync")]
#[command(version = "1.0.0")]
#[command(about = "Keeps catalog prices in step with supplier pages", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "price-sync.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process the next batch of the current catalog run (starting one if needed)
    Run {
        /// Treat as a user-triggered run: sync recently synced products too
        #[arg(long)]
        manual: bool,

        /// Keep invoking until the run finishes
        #[arg(long)]
        until_finished: bool,
    },

    /// Sync a single product now
    Sync {
        /// Product ID
        product_id: i64,
    },

    /// Show progress of the current or last run
    Status,

    /// Ask the running catalog run to stop
    Abort,

    /// Remove the run lock and all batch state
    ClearLock,

    /// Load products from a catalog TOML file
    Import {
        /// Path to the catalog file
        catalog: PathBuf,
    },

    /// Show recent sync log entries
    Logs {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Show product and sync statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).context(format!("loading {}", cli.config.display()));
        }
    };

    let result = match cli.command {
        Command::Run {
            manual,
            until_finished,
        } => handle_run(&config, manual, until_finished).await,
        Command::Sync { product_id } => handle_sync(&config, product_id).await,
        Command::Status => handle_status(&config),
        Command::Abort => handle_abort(&config),
        Command::ClearLock => handle_clear_lock(&config),
        Command::Import { catalog } => handle_import(&config, &catalog),
        Command::Logs { limit } => handle_logs(&config, limit),
        Command::Stats => handle_stats(&config),
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("price_sync=info,warn"),
            1 => EnvFilter::new("price_sync=debug,info"),
            2 => EnvFilter::new("price_sync=trace,debug"),
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

fn open_store(config: &Config) -> anyhow::Result<SqliteStorage> {
    open_storage(Path::new(&config.storage.database_path))
        .with_context(|| format!("opening database {}", config.storage.database_path))
}

fn build_coordinator(config: &Config) -> anyhow::Result<BatchCoordinator> {
    let storage = Arc::new(Mutex::new(open_store(config)?));
    let fetcher = Arc::new(HttpFetcher::new().context("building HTTP client")?);
    let event_log = EventLog::new(&config.logging.log_dir, config.sync.detailed_logging);

    let executor =
        SyncExecutor::new(storage, fetcher, config.sync.clone()).with_event_log(event_log);
    Ok(BatchCoordinator::new(executor))
}

fn print_snapshot(snapshot: &StatusSnapshot) {
    let state = if snapshot.aborted {
        "aborted"
    } else if snapshot.finished {
        "finished"
    } else if snapshot.running {
        "running"
    } else {
        "idle"
    };

    println!("Status: {}", state);
    println!(
        "Progress: {}/{} ({}%), {} failed",
        snapshot.completed + snapshot.failed,
        snapshot.total,
        snapshot.percent(),
        snapshot.failed
    );
    if !snapshot.current_product.is_empty() {
        println!("Current product: {}", snapshot.current_product);
    }
    if snapshot.needs_next_batch {
        println!("More batches pending");
    }
    if let Some(updated) = snapshot.updated_at {
        println!("Updated: {}", updated.format("%Y-%m-%d %H:%M:%S"));
    }
}

/// Handles `run`: one invocation, or invocations until the run finishes
async fn handle_run(config: &Config, manual: bool, until_finished: bool) -> anyhow::Result<()> {
    let coordinator = build_coordinator(config)?;
    let trigger = if manual {
        TriggerKind::Manual
    } else {
        TriggerKind::Cron
    };

    loop {
        let result = coordinator.run_one_invocation(trigger).await?;
        match &result {
            InvocationResult::AlreadyRunning(snapshot) => {
                println!("A sync is already running.");
                print_snapshot(snapshot);
                return Ok(());
            }
            InvocationResult::Ran(snapshot) => {
                print_snapshot(snapshot);
                if !(until_finished && snapshot.needs_next_batch) {
                    return Ok(());
                }
            }
        }
    }
}

/// Handles `sync <id>`
async fn handle_sync(config: &Config, product_id: i64) -> anyhow::Result<()> {
    let coordinator = build_coordinator(config)?;
    let outcome = coordinator.sync_single(product_id).await?;

    if outcome.success {
        println!("✓ Product {}: {}", product_id, outcome.message);
    } else {
        println!("✗ Product {}: {}", product_id, outcome.message);
    }
    Ok(())
}

fn handle_status(config: &Config) -> anyhow::Result<()> {
    let coordinator = build_coordinator(config)?;
    print_snapshot(&coordinator.status()?);
    Ok(())
}

fn handle_abort(config: &Config) -> anyhow::Result<()> {
    let coordinator = build_coordinator(config)?;
    if coordinator.request_abort()? {
        println!("Abort requested; the run stops after its current product.");
    } else {
        println!("No sync is running.");
    }
    Ok(())
}

fn handle_clear_lock(config: &Config) -> anyhow::Result<()> {
    let coordinator = build_coordinator(config)?;
    coordinator.clear_state()?;
    println!("✓ Sync lock and batch state cleared");
    Ok(())
}

fn handle_import(config: &Config, catalog: &Path) -> anyhow::Result<()> {
    let products = load_catalog(catalog)
        .with_context(|| format!("loading catalog {}", catalog.display()))?;
    let mut storage = open_store(config)?;

    for product in &products {
        storage.upsert_product(product)?;
    }

    println!("✓ Imported {} products", products.len());
    Ok(())
}

fn handle_logs(config: &Config, limit: usize) -> anyhow::Result<()> {
    let storage = open_store(config)?;
    let entries = storage.recent_logs(limit)?;

    if entries.is_empty() {
        println!("No sync activity yet.");
        return Ok(());
    }

    println!(
        "{:<19}  {:>8}  {:<7}  {:>10}  {:>10}  Message",
        "Time", "Product", "Status", "Old", "New"
    );
    for entry in entries {
        println!(
            "{:<19}  {:>8}  {:<7}  {:>10.2}  {:>10.2}  {}",
            entry.time.format("%Y-%m-%d %H:%M:%S"),
            entry.product_id,
            entry.status.to_db_string(),
            entry.old_price,
            entry.new_price,
            entry.message
        );
    }
    Ok(())
}

/// Handles `stats`: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_store(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}
