//! Storage layer for the memopark indexer.
//!
//! This module provides database operations for:
//! - Projections (current state of one entity, written by upsert)
//! - Append-only logs (actions, billing events, notifications)
//! - Sync state and block records (checkpoint and reorg detection)
//!
//! All writes of one block go through a single [`StoreTx`]; readers use the
//! pool directly and never see a half-applied block.

use alloy_primitives::B256;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, Transaction};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, trace, warn};

use crate::error::AppendConflict;

pub mod logs;
pub mod projections;
pub mod query;
pub mod sync;
pub mod types;

pub use query::DatabaseStats;
pub use types::*;

/// A "current state" row, replaced as a whole by id.
#[async_trait]
pub trait Projection: Sized + Send + Sync {
    /// Backing table.
    const TABLE: &'static str;

    /// Row id.
    fn id(&self) -> &str;

    /// Point lookup.
    async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>>;

    /// Insert or fully replace the row with this id.
    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<()>;
}

/// An immutable history row.
#[async_trait]
pub trait AppendOnly: Sized + Send + Sync + PartialEq + fmt::Debug {
    /// Backing table.
    fn table(&self) -> &'static str;

    /// Row id.
    fn id(&self) -> &str;

    /// Insert unless a row with the same id exists. Returns whether a row
    /// was written.
    async fn insert_if_absent(&self, conn: &mut SqliteConnection) -> Result<bool>;

    /// Load the stored row carrying this row's id.
    async fn load_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self>>;

    /// Whether `stored` records the same event as this row.
    fn same_as(&self, stored: &Self) -> bool {
        self == stored
    }
}

/// Result of an append-only insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The row is new.
    Inserted,
    /// An identical row was already stored (replay).
    Duplicate,
}

impl AppendOutcome {
    /// Whether the row was freshly written.
    pub fn is_inserted(&self) -> bool {
        matches!(self, AppendOutcome::Inserted)
    }
}

/// Database storage for the indexer.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// The database file is created if it doesn't exist.
    ///
    /// # Example
    /// ```no_run
    /// # use memopark_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://memopark.db", None, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance with a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }

    /// Start the write transaction of one block.
    pub async fn begin(&self) -> Result<StoreTx> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(StoreTx { tx })
    }

    /// Point lookup of a projection outside any block transaction.
    pub async fn find<P: Projection>(&self, id: &str) -> Result<Option<P>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        P::find(&mut *conn, id).await
    }

    /// Wipe every projected row and the checkpoint.
    ///
    /// Indexing restarts from the configured start block afterwards.
    pub async fn reset(&self) -> Result<()> {
        warn!("Resetting all indexed state");

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin reset")?;

        for table in DATA_TABLES {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to clear {}", table))?;
        }

        sqlx::query(
            r#"
            UPDATE sync_state
            SET last_block_number = NULL, last_block_hash = NULL, updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .context("Failed to reset sync state")?;

        tx.commit().await.context("Failed to commit reset")?;

        info!("Indexed state cleared");
        Ok(())
    }
}

/// Indexed tables, wiped by [`Storage::reset`].
pub(crate) const DATA_TABLES: [&str; 22] = [
    "blocks",
    "listings",
    "listing_actions",
    "orders",
    "order_actions",
    "arbitration_cases",
    "arbitration_actions",
    "arb_daily_stats",
    "gov_cases",
    "gov_actions",
    "graves",
    "grave_actions",
    "offerings",
    "offering_settlements",
    "offering_price_snapshots",
    "guestbook_messages",
    "media_items",
    "pin_overviews",
    "pin_billing_events",
    "referral_codes",
    "referral_links",
    "notifications",
];

/// Write transaction of one block.
///
/// Dropping it without [`StoreTx::commit`] rolls every write back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    /// Underlying connection, for rollups and sync bookkeeping.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Point lookup inside the transaction.
    pub async fn find<P: Projection>(&mut self, id: &str) -> Result<Option<P>> {
        P::find(&mut *self.tx, id).await
    }

    /// Insert or fully replace a projection row.
    pub async fn upsert<P: Projection>(&mut self, row: &P) -> Result<()> {
        trace!(table = P::TABLE, id = row.id(), "Upserting projection");
        row.upsert(&mut *self.tx).await
    }

    /// Insert an append-only row.
    ///
    /// An identical stored row is a replay and yields
    /// [`AppendOutcome::Duplicate`]; a stored row with the same id and
    /// different content is an [`AppendConflict`].
    pub async fn append<A: AppendOnly>(&mut self, row: &A) -> Result<AppendOutcome> {
        if row.insert_if_absent(&mut *self.tx).await? {
            return Ok(AppendOutcome::Inserted);
        }

        match row.load_existing(&mut *self.tx).await? {
            Some(existing) if row.same_as(&existing) => Ok(AppendOutcome::Duplicate),
            _ => Err(AppendConflict {
                table: row.table(),
                id: row.id().to_string(),
            }
            .into()),
        }
    }

    /// Record a state transition: append the history row, then replace the
    /// projection. The projection is only written when the history row is
    /// new, so replays never move state.
    pub async fn apply_transition<P, A>(
        &mut self,
        projection: Option<&P>,
        action: &A,
    ) -> Result<AppendOutcome>
    where
        P: Projection,
        A: AppendOnly,
    {
        let outcome = self.append(action).await?;
        if outcome.is_inserted() {
            if let Some(row) = projection {
                self.upsert(row).await?;
            }
        }
        Ok(outcome)
    }

    /// Commit every write of the block.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit block")
    }
}

// ---------------------------------------------------------------------------
// Column codecs
// ---------------------------------------------------------------------------

pub(crate) fn amount_to_text(value: u128) -> String {
    value.to_string()
}

pub(crate) fn text_to_amount(row: &SqliteRow, column: &str) -> Result<u128> {
    let text: String = row.try_get(column)?;
    text.parse::<u128>()
        .with_context(|| format!("Column {} holds a non-numeric amount: {}", column, text))
}

pub(crate) fn opt_text_to_amount(row: &SqliteRow, column: &str) -> Result<Option<u128>> {
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| {
        t.parse::<u128>()
            .with_context(|| format!("Column {} holds a non-numeric amount: {}", column, t))
    })
    .transpose()
}

pub(crate) fn get_u64(row: &SqliteRow, column: &str) -> Result<u64> {
    Ok(row.try_get::<i64, _>(column)? as u64)
}

pub(crate) fn get_opt_u64(row: &SqliteRow, column: &str) -> Result<Option<u64>> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(|v| v as u64))
}

pub(crate) fn get_bool(row: &SqliteRow, column: &str) -> Result<bool> {
    Ok(row.try_get::<i64, _>(column)? != 0)
}

pub(crate) fn get_hash(row: &SqliteRow, column: &str) -> Result<Option<B256>> {
    let bytes: Option<Vec<u8>> = row.try_get(column)?;
    bytes
        .map(|b| {
            if b.len() != 32 {
                anyhow::bail!("Column {} holds a {}-byte hash", column, b.len());
            }
            Ok(B256::from_slice(&b))
        })
        .transpose()
}

pub(crate) fn get_parsed<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.try_get(column)?;
    Ok(text.parse::<T>()?)
}
