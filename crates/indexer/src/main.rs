//! Memopark Indexer - chain event projection
//!
//! This binary provides:
//! - Block sync from the configured source with retry and backoff
//! - Event projection into entity tables and append-only logs
//! - Status, database initialisation and reset commands
//!
//! Note: querying the projected data is left to separate read-only services

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use memopark_indexer::config::{Config, LoggingConfig, SourceConfig, SourceKind};
use memopark_indexer::mapper::Mapper;
use memopark_indexer::source::{BlockSource, JsonlSource};
use memopark_indexer::storage::Storage;
use memopark_indexer::sync::SyncEngine;

const DEFAULT_DATABASE_URL: &str = "sqlite://memopark.db";

#[derive(Parser)]
#[command(name = "memopark-indexer")]
#[command(version, about = "Projects memopark chain events into SQLite", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "indexer.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the indexer (sync until Ctrl+C)
    Run,

    /// Show indexer status and sync progress
    Status,

    /// Initialize the database
    InitDb {
        /// Database URL (defaults to the configured one)
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Wipe all projected state so indexing restarts from `start_block`
    Reset {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when there is one.
    let config = load_optional_config(&cli.config)?;
    init_logging(cli.debug, config.as_ref().map(|c| &c.logging))?;

    info!("Memopark Indexer starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = config.with_context(|| {
                format!("Configuration file {} not found", cli.config)
            })?;
            run_indexer(config).await?
        }
        Commands::Status => show_status(config.as_ref()).await?,
        Commands::InitDb { database_url } => {
            let url = database_url
                .or_else(|| config.as_ref().map(|c| c.database.url.clone()))
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
            init_database(&url).await?
        }
        Commands::Reset { yes } => reset_database(config.as_ref(), yes).await?,
    }

    Ok(())
}

/// Load the config file, treating a missing file as "no config".
fn load_optional_config(path: &str) -> Result<Option<Config>> {
    match Config::from_file(path) {
        Ok(config) => Ok(Some(config)),
        Err(e) => {
            // Config::from_file wraps the I/O error in context.
            let is_not_found = e.chain().any(|cause| {
                cause
                    .downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
            });

            if is_not_found {
                Ok(None)
            } else {
                Err(e).context("Failed to load config file")
            }
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool, logging: Option<&LoggingConfig>) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

    let level = logging.map(|l| l.level.to_lowercase()).unwrap_or_else(|| "info".to_string());
    let json = logging.map(|l| l.format.eq_ignore_ascii_case("json")).unwrap_or(false);

    let env_filter = if debug {
        EnvFilter::new("memopark_indexer=debug,memopark_core=debug,sqlx=warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("memopark_indexer={},memopark_core={},sqlx=warn", level, level))
        })
    };

    let fmt_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

async fn open_storage(url: &str, max_conn: Option<u32>, min_conn: Option<u32>) -> Result<Storage> {
    let storage = Storage::new(url, max_conn, min_conn)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

async fn open_configured_storage(config: Option<&Config>) -> Result<Storage> {
    match config {
        Some(config) => {
            info!("Using database from config: {}", config.database.url);
            open_storage(
                &config.database.url,
                Some(config.database.max_connections),
                Some(config.database.min_connections),
            )
            .await
        }
        None => {
            info!("Config file not found, using default database: {}", DEFAULT_DATABASE_URL);
            open_storage(DEFAULT_DATABASE_URL, None, None).await
        }
    }
}

fn build_source(config: &SourceConfig) -> Result<Arc<dyn BlockSource>> {
    match config.kind {
        SourceKind::Jsonl => {
            let path = config
                .path
                .clone()
                .context("source.path is required for jsonl sources")?;
            info!("  Source: jsonl {}", path.display());
            Ok(Arc::new(JsonlSource::new(path)))
        }
    }
}

/// Main indexer service - runs the sync engine until stopped
async fn run_indexer(config: Config) -> Result<()> {
    info!("Configuration loaded successfully");
    info!("  Database: {}", config.database.url);
    info!("  Start block: {}", config.sync.start_block);
    info!("  Blocks per day: {}", config.mapper.blocks_per_day);

    let source = build_source(&config.source)?;
    let storage = open_configured_storage(Some(&config)).await?;
    info!("Database initialized");

    let sync_state = storage.get_sync_state().await?;
    match sync_state.last_block_number {
        Some(last) => info!("Existing sync state found: last_block={}", last),
        None => info!(
            "Fresh database detected, will start syncing from block {}",
            config.sync.start_block
        ),
    }

    let mapper = Mapper::new(config.mapper.blocks_per_day)?;
    let engine = SyncEngine::new(source, storage.clone(), mapper, config.sync.clone());

    let cancel = CancellationToken::new();
    let engine_cancel = cancel.clone();
    let mut sync_handle = tokio::spawn(async move { engine.run(engine_cancel).await });

    info!("Indexer is running. Press Ctrl+C to stop.");

    let result = tokio::select! {
        result = &mut sync_handle => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, finishing the current block...");
            cancel.cancel();
            sync_handle.await
        }
    };

    storage.close().await;

    match result {
        Ok(Ok(())) => {
            info!("Indexer stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(e).context("Sync engine failed"),
        Err(e) => Err(anyhow::anyhow!("Sync task panicked: {}", e)),
    }
}

/// Show sync progress and table counts
async fn show_status(config: Option<&Config>) -> Result<()> {
    info!("Checking indexer status");

    let storage = open_configured_storage(config).await?;

    let sync_state = storage.get_sync_state().await?;
    let stats = storage.stats().await?;
    let recent = storage.get_recent_blocks(5).await?;

    println!("\n=== Memopark Indexer Status ===\n");
    println!("Sync Progress:");
    match sync_state.last_block_number {
        Some(last) => println!("  Last Block: {}", last),
        None => println!("  Last Block: none (fresh database)"),
    }
    if let Some(hash) = sync_state.last_block_hash {
        println!("  Last Block Hash: {}", hash);
    }
    println!(
        "  Last Updated: {}",
        chrono::DateTime::from_timestamp(sync_state.updated_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );

    println!("\nDatabase Statistics:");
    println!("  Indexed Blocks: {}", stats.block_count);
    println!("  Listings: {}", stats.listing_count);
    println!("  Orders: {}", stats.order_count);
    println!("  Arbitration Cases: {}", stats.case_count);
    println!("  Governance Cases: {}", stats.gov_case_count);
    println!("  Graves: {}", stats.grave_count);
    println!("  Pinned Content: {}", stats.pin_count);
    println!("  Notifications: {}", stats.notification_count);

    if !recent.is_empty() {
        println!("\nRecent Blocks:");
        for block in recent {
            println!(
                "  #{}: {} events, {} applied, {} skipped",
                block.block_number, block.event_count, block.applied, block.skipped
            );
        }
    }

    println!();

    storage.close().await;

    Ok(())
}

/// Initialize the database
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = open_storage(database_url, None, None).await?;

    // Verify database is working
    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Blocks: {}", stats.block_count);
    match stats.last_block_number {
        Some(last) => info!("  Last block: {}", last),
        None => info!("  Last block: none"),
    }

    storage.close().await;

    Ok(())
}

/// Wipe projected state and the checkpoint
async fn reset_database(config: Option<&Config>, confirmed: bool) -> Result<()> {
    if !confirmed {
        warn!("Reset deletes every projected row; re-run with --yes to confirm");
        return Ok(());
    }

    let storage = open_configured_storage(config).await?;
    storage.reset().await.context("Failed to reset database")?;
    info!("Database reset; the next run re-indexes from start_block");
    storage.close().await;

    Ok(())
}
