//! Sync state storage operations.
//!
//! The checkpoint advances inside the same transaction as the block it
//! records, so the stored height always names a fully applied block.

use alloy_primitives::B256;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{get_hash, get_opt_u64, get_u64, BlockRecord, Storage, StoreTx, SyncState};
use crate::error::ReorgDetected;

impl Storage {
    /// Get the current sync state.
    pub async fn get_sync_state(&self) -> Result<SyncState> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        load_sync_state(&mut *conn).await
    }

    /// Get a block record by number.
    pub async fn get_block(&self, block_number: u64) -> Result<Option<BlockRecord>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        load_block(&mut *conn, block_number).await
    }

    /// Most recently indexed block records, newest first.
    pub async fn get_recent_blocks(&self, limit: u32) -> Result<Vec<BlockRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT block_number, block_hash, parent_hash,
                   event_count, applied, skipped, indexed_at
            FROM blocks
            ORDER BY block_number DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent blocks")?;

        rows.iter().map(row_to_block_record).collect()
    }
}

impl StoreTx {
    /// Sync state as seen by this transaction.
    pub async fn sync_state(&mut self) -> Result<SyncState> {
        load_sync_state(self.conn()).await
    }

    /// Reject a block whose parent hash contradicts the stored chain.
    ///
    /// Nothing is checked when either side lacks a hash or the previous
    /// height was never recorded.
    pub async fn check_parent(&mut self, height: u64, parent_hash: Option<B256>) -> Result<()> {
        let (Some(parent_hash), Some(previous)) = (parent_hash, height.checked_sub(1)) else {
            return Ok(());
        };

        let state = self.sync_state().await?;
        let stored = if state.last_block_number == Some(previous) {
            state.last_block_hash
        } else {
            load_block(self.conn(), previous)
                .await?
                .and_then(|block| block.block_hash)
        };

        match stored {
            Some(stored_hash) if stored_hash != parent_hash => Err(ReorgDetected {
                height,
                parent_hash,
                stored_hash,
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// Record the block and move the checkpoint to it.
    pub async fn finish_block(&mut self, block: &BlockRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blocks (
                block_number, block_hash, parent_hash,
                event_count, applied, skipped, indexed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(block_number) DO UPDATE SET
                block_hash = excluded.block_hash,
                parent_hash = excluded.parent_hash,
                event_count = excluded.event_count,
                applied = excluded.applied,
                skipped = excluded.skipped,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(block.block_number as i64)
        .bind(block.block_hash.as_ref().map(|h| h.as_slice()))
        .bind(block.parent_hash.as_ref().map(|h| h.as_slice()))
        .bind(block.event_count as i64)
        .bind(block.applied as i64)
        .bind(block.skipped as i64)
        .bind(block.indexed_at)
        .execute(self.conn())
        .await
        .context("Failed to insert block")?;

        sqlx::query(
            r#"
            UPDATE sync_state
            SET last_block_number = ?,
                last_block_hash = ?,
                updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(block.block_number as i64)
        .bind(block.block_hash.as_ref().map(|h| h.as_slice()))
        .bind(block.indexed_at)
        .execute(self.conn())
        .await
        .context("Failed to update sync state")?;

        Ok(())
    }
}

async fn load_sync_state(conn: &mut SqliteConnection) -> Result<SyncState> {
    let row = sqlx::query(
        r#"
        SELECT last_block_number, last_block_hash, updated_at
        FROM sync_state
        WHERE id = 1
        "#,
    )
    .fetch_one(&mut *conn)
    .await
    .context("Failed to fetch sync state")?;

    Ok(SyncState {
        last_block_number: get_opt_u64(&row, "last_block_number")?,
        last_block_hash: get_hash(&row, "last_block_hash")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn load_block(conn: &mut SqliteConnection, block_number: u64) -> Result<Option<BlockRecord>> {
    let row = sqlx::query(
        r#"
        SELECT block_number, block_hash, parent_hash,
               event_count, applied, skipped, indexed_at
        FROM blocks
        WHERE block_number = ?
        "#,
    )
    .bind(block_number as i64)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to fetch block")?;

    row.as_ref().map(row_to_block_record).transpose()
}

fn row_to_block_record(row: &SqliteRow) -> Result<BlockRecord> {
    Ok(BlockRecord {
        block_number: get_u64(row, "block_number")?,
        block_hash: get_hash(row, "block_hash")?,
        parent_hash: get_hash(row, "parent_hash")?,
        event_count: get_u64(row, "event_count")?,
        applied: get_u64(row, "applied")?,
        skipped: get_u64(row, "skipped")?,
        indexed_at: row.try_get("indexed_at")?,
    })
}
