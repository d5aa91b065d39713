//! Append-only rows: insert-if-absent plus a reload for replay comparison.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{
    amount_to_text, get_hash, get_opt_u64, get_u64, opt_text_to_amount, text_to_amount,
    ActionLog, ActionRecord, AppendOnly, GuestbookMessage, MediaItem, Notification, Offering,
    OfferingPriceSnapshot, OfferingSettlement, PinBillingEvent, ReferralLink,
};

#[async_trait]
impl AppendOnly for ActionRecord {
    fn table(&self) -> &'static str {
        self.log.table()
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn insert_if_absent(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, entity_ref, kind, block, index_in_block, extrinsic_hash, meta)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
            self.log.table()
        );

        let result = sqlx::query(&sql)
            .bind(self.id.as_str())
            .bind(self.entity_ref.as_str())
            .bind(self.kind.as_str())
            .bind(self.block as i64)
            .bind(self.index_in_block as i64)
            .bind(self.extrinsic_hash.as_ref().map(|h| h.as_slice()))
            .bind(self.meta.as_deref())
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to append to {}", self.log.table()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT id, entity_ref, kind, block, index_in_block, extrinsic_hash, meta FROM {} WHERE id = ?",
            self.log.table()
        );

        let row = sqlx::query(&sql)
            .bind(self.id.as_str())
            .fetch_optional(&mut *conn)
            .await
            .with_context(|| format!("Failed to load from {}", self.log.table()))?;

        row.as_ref()
            .map(|row| row_to_action(self.log, row))
            .transpose()
    }

    // A kind repeated on one entity within a block maps to the id of its
    // first occurrence, which keeps its position.
    fn same_as(&self, stored: &Self) -> bool {
        *self == ActionRecord {
            index_in_block: self.index_in_block,
            ..stored.clone()
        }
    }
}

pub(crate) fn row_to_action(log: ActionLog, row: &SqliteRow) -> Result<ActionRecord> {
    Ok(ActionRecord {
        log,
        id: row.try_get("id")?,
        entity_ref: row.try_get("entity_ref")?,
        kind: row.try_get("kind")?,
        block: get_u64(row, "block")?,
        index_in_block: get_u64(row, "index_in_block")? as u32,
        extrinsic_hash: get_hash(row, "extrinsic_hash")?,
        meta: row.try_get("meta")?,
    })
}

#[async_trait]
impl AppendOnly for PinBillingEvent {
    fn table(&self) -> &'static str {
        "pin_billing_events"
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn insert_if_absent(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO pin_billing_events
                (id, cid, kind, amount, next_charge_at, block, index_in_block, extrinsic_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.cid.as_str())
        .bind(self.kind.as_str())
        .bind(self.amount.map(amount_to_text))
        .bind(self.next_charge_at.map(|v| v as i64))
        .bind(self.block as i64)
        .bind(self.index_in_block as i64)
        .bind(self.extrinsic_hash.as_ref().map(|h| h.as_slice()))
        .execute(&mut *conn)
        .await
        .context("Failed to append pin billing event")?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, cid, kind, amount, next_charge_at, block, index_in_block, extrinsic_hash
            FROM pin_billing_events
            WHERE id = ?
            "#,
        )
        .bind(self.id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load pin billing event")?;

        row.as_ref().map(row_to_billing_event).transpose()
    }

    fn same_as(&self, stored: &Self) -> bool {
        *self == PinBillingEvent {
            index_in_block: self.index_in_block,
            ..stored.clone()
        }
    }
}

pub(crate) fn row_to_billing_event(row: &SqliteRow) -> Result<PinBillingEvent> {
    Ok(PinBillingEvent {
        id: row.try_get("id")?,
        cid: row.try_get("cid")?,
        kind: row.try_get("kind")?,
        amount: opt_text_to_amount(row, "amount")?,
        next_charge_at: get_opt_u64(row, "next_charge_at")?,
        block: get_u64(row, "block")?,
        index_in_block: get_u64(row, "index_in_block")? as u32,
        extrinsic_hash: get_hash(row, "extrinsic_hash")?,
    })
}

#[async_trait]
impl AppendOnly for Offering {
    fn table(&self) -> &'static str {
        "offerings"
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn insert_if_absent(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO offerings (id, target_domain, target_id, who, kind_code, amount, block)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.target_domain as i64)
        .bind(self.target_id as i64)
        .bind(self.who.as_str())
        .bind(self.kind_code.map(|v| v as i64))
        .bind(amount_to_text(self.amount))
        .bind(self.block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to append offering")?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, target_domain, target_id, who, kind_code, amount, block
            FROM offerings
            WHERE id = ?
            "#,
        )
        .bind(self.id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load offering")?;

        row.as_ref()
            .map(|row| -> Result<_> {
                Ok(Offering {
                    id: row.try_get("id")?,
                    target_domain: get_u64(row, "target_domain")?,
                    target_id: get_u64(row, "target_id")?,
                    who: row.try_get("who")?,
                    kind_code: get_opt_u64(row, "kind_code")?,
                    amount: text_to_amount(row, "amount")?,
                    block: get_u64(row, "block")?,
                })
            })
            .transpose()
    }
}

#[async_trait]
impl AppendOnly for OfferingSettlement {
    fn table(&self) -> &'static str {
        "offering_settlements"
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn insert_if_absent(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO offering_settlements (id, offering_id, recipient, amount, block, extrinsic_hash)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.offering_id.as_str())
        .bind(self.recipient.as_deref())
        .bind(amount_to_text(self.amount))
        .bind(self.block as i64)
        .bind(self.extrinsic_hash.as_ref().map(|h| h.as_slice()))
        .execute(&mut *conn)
        .await
        .context("Failed to append offering settlement")?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, offering_id, recipient, amount, block, extrinsic_hash
            FROM offering_settlements
            WHERE id = ?
            "#,
        )
        .bind(self.id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load offering settlement")?;

        row.as_ref()
            .map(|row| -> Result<_> {
                Ok(OfferingSettlement {
                    id: row.try_get("id")?,
                    offering_id: row.try_get("offering_id")?,
                    recipient: row.try_get("recipient")?,
                    amount: text_to_amount(row, "amount")?,
                    block: get_u64(row, "block")?,
                    extrinsic_hash: get_hash(row, "extrinsic_hash")?,
                })
            })
            .transpose()
    }
}

#[async_trait]
impl AppendOnly for OfferingPriceSnapshot {
    fn table(&self) -> &'static str {
        "offering_price_snapshots"
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn insert_if_absent(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO offering_price_snapshots (id, kind_code, fixed_price, unit_price_per_week, block)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.kind_code as i64)
        .bind(self.fixed_price.map(amount_to_text))
        .bind(self.unit_price_per_week.map(amount_to_text))
        .bind(self.block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to append price snapshot")?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, kind_code, fixed_price, unit_price_per_week, block
            FROM offering_price_snapshots
            WHERE id = ?
            "#,
        )
        .bind(self.id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load price snapshot")?;

        row.as_ref().map(row_to_price_snapshot).transpose()
    }
}

pub(crate) fn row_to_price_snapshot(row: &SqliteRow) -> Result<OfferingPriceSnapshot> {
    Ok(OfferingPriceSnapshot {
        id: row.try_get("id")?,
        kind_code: get_u64(row, "kind_code")?,
        fixed_price: opt_text_to_amount(row, "fixed_price")?,
        unit_price_per_week: opt_text_to_amount(row, "unit_price_per_week")?,
        block: get_u64(row, "block")?,
    })
}

#[async_trait]
impl AppendOnly for ReferralLink {
    fn table(&self) -> &'static str {
        "referral_links"
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn insert_if_absent(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO referral_links (id, who, sponsor, block)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.who.as_str())
        .bind(self.sponsor.as_str())
        .bind(self.block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to append referral link")?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self>> {
        let row = sqlx::query("SELECT id, who, sponsor, block FROM referral_links WHERE id = ?")
            .bind(self.id.as_str())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to load referral link")?;

        row.as_ref()
            .map(|row| -> Result<_> {
                Ok(ReferralLink {
                    id: row.try_get("id")?,
                    who: row.try_get("who")?,
                    sponsor: row.try_get("sponsor")?,
                    block: get_u64(row, "block")?,
                })
            })
            .transpose()
    }
}

#[async_trait]
impl AppendOnly for GuestbookMessage {
    fn table(&self) -> &'static str {
        "guestbook_messages"
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn insert_if_absent(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO guestbook_messages (id, grave_id, who, block)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.grave_id as i64)
        .bind(self.who.as_str())
        .bind(self.block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to append guestbook message")?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self>> {
        let row =
            sqlx::query("SELECT id, grave_id, who, block FROM guestbook_messages WHERE id = ?")
                .bind(self.id.as_str())
                .fetch_optional(&mut *conn)
                .await
                .context("Failed to load guestbook message")?;

        row.as_ref()
            .map(|row| -> Result<_> {
                Ok(GuestbookMessage {
                    id: row.try_get("id")?,
                    grave_id: get_u64(row, "grave_id")?,
                    who: row.try_get("who")?,
                    block: get_u64(row, "block")?,
                })
            })
            .transpose()
    }
}

#[async_trait]
impl AppendOnly for MediaItem {
    fn table(&self) -> &'static str {
        "media_items"
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn insert_if_absent(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO media_items (id, album_id, block)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.album_id as i64)
        .bind(self.block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to append media item")?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self>> {
        let row = sqlx::query("SELECT id, album_id, block FROM media_items WHERE id = ?")
            .bind(self.id.as_str())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to load media item")?;

        row.as_ref()
            .map(|row| -> Result<_> {
                Ok(MediaItem {
                    id: row.try_get("id")?,
                    album_id: get_u64(row, "album_id")?,
                    block: get_u64(row, "block")?,
                })
            })
            .transpose()
    }
}

#[async_trait]
impl AppendOnly for Notification {
    fn table(&self) -> &'static str {
        "notifications"
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn insert_if_absent(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (id, module, kind, ref_id, actor, block, extrinsic_hash, meta)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.module.as_str())
        .bind(self.kind.as_str())
        .bind(self.ref_id.as_str())
        .bind(self.actor.as_deref())
        .bind(self.block as i64)
        .bind(self.extrinsic_hash.as_ref().map(|h| h.as_slice()))
        .bind(self.meta.as_deref())
        .execute(&mut *conn)
        .await
        .context("Failed to append notification")?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, module, kind, ref_id, actor, block, extrinsic_hash, meta
            FROM notifications
            WHERE id = ?
            "#,
        )
        .bind(self.id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load notification")?;

        row.as_ref().map(row_to_notification).transpose()
    }
}

pub(crate) fn row_to_notification(row: &SqliteRow) -> Result<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        module: row.try_get("module")?,
        kind: row.try_get("kind")?,
        ref_id: row.try_get("ref_id")?,
        actor: row.try_get("actor")?,
        block: get_u64(row, "block")?,
        extrinsic_hash: get_hash(row, "extrinsic_hash")?,
        meta: row.try_get("meta")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::setup_storage;
    use crate::storage::AppendOutcome;
    use alloy_primitives::B256;

    #[tokio::test]
    async fn test_notification_replay_compares_hash() {
        let (storage, _temp_db) = setup_storage().await;

        let note = Notification {
            id: "N-100-0".to_string(),
            module: "otc_listing".to_string(),
            kind: "ListingCreated".to_string(),
            ref_id: "7".to_string(),
            actor: Some("A".to_string()),
            block: 100,
            extrinsic_hash: Some(B256::repeat_byte(0x11)),
            meta: None,
        };

        let mut tx = storage.begin().await.unwrap();
        assert_eq!(tx.append(&note).await.unwrap(), AppendOutcome::Inserted);
        assert_eq!(tx.append(&note).await.unwrap(), AppendOutcome::Duplicate);

        let forged = Notification {
            extrinsic_hash: Some(B256::repeat_byte(0x22)),
            ..note.clone()
        };
        assert!(tx.append(&forged).await.is_err());
    }

    #[tokio::test]
    async fn test_billing_event_optional_amount() {
        let (storage, _temp_db) = setup_storage().await;

        let grace = PinBillingEvent {
            id: "0xaa-Grace-40".to_string(),
            cid: "0xaa".to_string(),
            kind: "Grace".to_string(),
            amount: None,
            next_charge_at: Some(500),
            block: 40,
            index_in_block: 2,
            extrinsic_hash: None,
        };

        let mut tx = storage.begin().await.unwrap();
        tx.append(&grace).await.unwrap();
        let loaded = grace.load_existing(tx.conn()).await.unwrap();
        assert_eq!(loaded, Some(grace));
    }

    #[tokio::test]
    async fn test_action_logs_are_separate_tables() {
        let (storage, _temp_db) = setup_storage().await;

        let listing = ActionRecord {
            log: ActionLog::Listing,
            id: "7-Created-100".to_string(),
            entity_ref: "7".to_string(),
            kind: "Created".to_string(),
            block: 100,
            index_in_block: 0,
            extrinsic_hash: None,
            meta: None,
        };
        let order = ActionRecord {
            log: ActionLog::Order,
            ..listing.clone()
        };

        let mut tx = storage.begin().await.unwrap();
        assert!(tx.append(&listing).await.unwrap().is_inserted());
        assert!(tx.append(&order).await.unwrap().is_inserted());
    }

    #[tokio::test]
    async fn test_repeated_kind_in_block_keeps_first_position() {
        let (storage, _temp_db) = setup_storage().await;

        let first = ActionRecord {
            log: ActionLog::Listing,
            id: "7-Canceled-100".to_string(),
            entity_ref: "7".to_string(),
            kind: "Canceled".to_string(),
            block: 100,
            index_in_block: 1,
            extrinsic_hash: None,
            meta: None,
        };
        let repeat = ActionRecord {
            index_in_block: 4,
            ..first.clone()
        };

        let mut tx = storage.begin().await.unwrap();
        assert!(tx.append(&first).await.unwrap().is_inserted());
        assert_eq!(tx.append(&repeat).await.unwrap(), AppendOutcome::Duplicate);

        let stored = first.load_existing(tx.conn()).await.unwrap().unwrap();
        assert_eq!(stored.index_in_block, 1);

        let changed = ActionRecord {
            meta: Some("{}".to_string()),
            ..repeat
        };
        assert!(tx.append(&changed).await.is_err());
    }
}
