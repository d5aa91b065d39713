//! Read-only queries for downstream consumers and the `status` command.

use anyhow::{Context, Result};

use super::logs::{row_to_action, row_to_billing_event, row_to_notification, row_to_price_snapshot};
use super::projections::row_to_daily_stat;
use super::{
    ActionLog, ActionRecord, ArbDailyStat, ArbitrationCase, GovCase, Grave, Listing, Notification,
    OfferingPriceSnapshot, Order, PinBillingEvent, PinOverview, Projection, Storage, DATA_TABLES,
};

impl Storage {
    /// Action history of one entity in chain order.
    pub async fn actions_for(&self, log: ActionLog, entity_ref: &str) -> Result<Vec<ActionRecord>> {
        let sql = format!(
            r#"
            SELECT id, entity_ref, kind, block, index_in_block, extrinsic_hash, meta
            FROM {}
            WHERE entity_ref = ?
            ORDER BY block ASC, index_in_block ASC
            "#,
            log.table()
        );

        let rows = sqlx::query(&sql)
            .bind(entity_ref)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch {}", log.table()))?;

        rows.iter().map(|row| row_to_action(log, row)).collect()
    }

    /// Billing history of one content id in chain order.
    pub async fn billing_events_for(&self, cid: &str) -> Result<Vec<PinBillingEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, cid, kind, amount, next_charge_at, block, index_in_block, extrinsic_hash
            FROM pin_billing_events
            WHERE cid = ?
            ORDER BY block ASC, index_in_block ASC
            "#,
        )
        .bind(cid)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch pin billing events")?;

        rows.iter().map(row_to_billing_event).collect()
    }

    /// Notifications emitted in `[from, to]`, in chain order.
    pub async fn notifications_in_range(&self, from: u64, to: u64) -> Result<Vec<Notification>> {
        // Ids sort lexically, so order by the numeric parts explicitly.
        let rows = sqlx::query(
            r#"
            SELECT id, module, kind, ref_id, actor, block, extrinsic_hash, meta
            FROM notifications
            WHERE block >= ? AND block <= ?
            ORDER BY block ASC, CAST(substr(id, length('N-' || block || '-') + 1) AS INTEGER) ASC
            "#,
        )
        .bind(from as i64)
        .bind(to as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch notifications")?;

        rows.iter().map(row_to_notification).collect()
    }

    /// Notifications that reference one entity, oldest first.
    pub async fn notifications_for(&self, ref_id: &str) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, module, kind, ref_id, actor, block, extrinsic_hash, meta
            FROM notifications
            WHERE ref_id = ?
            ORDER BY block ASC, CAST(substr(id, length('N-' || block || '-') + 1) AS INTEGER) ASC
            "#,
        )
        .bind(ref_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch notifications")?;

        rows.iter().map(row_to_notification).collect()
    }

    /// Arbitration counters of one day bucket.
    pub async fn daily_stats(&self, day: u64) -> Result<Option<ArbDailyStat>> {
        let row = sqlx::query(
            r#"
            SELECT id, day, disputes, arbitrated, release, refund, partial, updated_block
            FROM arb_daily_stats
            WHERE day = ?
            "#,
        )
        .bind(day as i64)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch daily stats")?;

        row.as_ref().map(row_to_daily_stat).transpose()
    }

    /// Price timeline of one offering kind, oldest first.
    pub async fn price_history(&self, kind_code: u64) -> Result<Vec<OfferingPriceSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind_code, fixed_price, unit_price_per_week, block
            FROM offering_price_snapshots
            WHERE kind_code = ?
            ORDER BY block ASC
            "#,
        )
        .bind(kind_code as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch price history")?;

        rows.iter().map(row_to_price_snapshot).collect()
    }

    /// Count rows of one indexed table.
    pub async fn count(&self, table: &str) -> Result<u64> {
        if !DATA_TABLES.contains(&table) {
            anyhow::bail!("Unknown table: {}", table);
        }

        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", table))?;

        Ok(count as u64)
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let sync_state = self.get_sync_state().await?;

        Ok(DatabaseStats {
            block_count: self.count("blocks").await?,
            listing_count: self.count(Listing::TABLE).await?,
            order_count: self.count(Order::TABLE).await?,
            case_count: self.count(ArbitrationCase::TABLE).await?,
            gov_case_count: self.count(GovCase::TABLE).await?,
            grave_count: self.count(Grave::TABLE).await?,
            pin_count: self.count(PinOverview::TABLE).await?,
            notification_count: self.count("notifications").await?,
            last_block_number: sync_state.last_block_number,
        })
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Indexed blocks
    pub block_count: u64,

    /// Listings
    pub listing_count: u64,

    /// Orders
    pub order_count: u64,

    /// Arbitration cases
    pub case_count: u64,

    /// Governance cases
    pub gov_case_count: u64,

    /// Graves
    pub grave_count: u64,

    /// Pinned content ids
    pub pin_count: u64,

    /// Notification feed rows
    pub notification_count: u64,

    /// Last applied block number
    pub last_block_number: Option<u64>,
}
