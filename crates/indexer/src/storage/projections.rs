//! Projection rows: point lookup and full replace by id.

use anyhow::{Context, Result};
use async_trait::async_trait;
use memopark_core::{Decision, GovObjectId, GovScope};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{
    amount_to_text, get_bool, get_opt_u64, get_parsed, get_u64, text_to_amount, ArbDailyStat,
    ArbitrationCase, GovCase, Grave, Listing, Order, PinOverview, Projection, ReferralCode,
};

#[async_trait]
impl Projection for Listing {
    const TABLE: &'static str = "listings";

    fn id(&self) -> &str {
        &self.id
    }

    async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, maker, side, base, quote, price, min_qty, max_qty,
                   total, remaining, partial, expire_at, active,
                   created_block, updated_block
            FROM listings
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load listing")?;

        row.as_ref().map(row_to_listing).transpose()
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO listings (
                id, maker, side, base, quote, price, min_qty, max_qty,
                total, remaining, partial, expire_at, active,
                created_block, updated_block
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                maker = excluded.maker,
                side = excluded.side,
                base = excluded.base,
                quote = excluded.quote,
                price = excluded.price,
                min_qty = excluded.min_qty,
                max_qty = excluded.max_qty,
                total = excluded.total,
                remaining = excluded.remaining,
                partial = excluded.partial,
                expire_at = excluded.expire_at,
                active = excluded.active,
                created_block = excluded.created_block,
                updated_block = excluded.updated_block
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.maker.as_str())
        .bind(self.side.as_str())
        .bind(self.base as i64)
        .bind(self.quote as i64)
        .bind(amount_to_text(self.price))
        .bind(amount_to_text(self.min_qty))
        .bind(amount_to_text(self.max_qty))
        .bind(amount_to_text(self.total))
        .bind(amount_to_text(self.remaining))
        .bind(self.partial as i64)
        .bind(self.expire_at as i64)
        .bind(self.active as i64)
        .bind(self.created_block as i64)
        .bind(self.updated_block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to upsert listing")?;

        Ok(())
    }
}

fn row_to_listing(row: &SqliteRow) -> Result<Listing> {
    Ok(Listing {
        id: row.try_get("id")?,
        maker: row.try_get("maker")?,
        side: get_parsed(row, "side")?,
        base: get_u64(row, "base")?,
        quote: get_u64(row, "quote")?,
        price: text_to_amount(row, "price")?,
        min_qty: text_to_amount(row, "min_qty")?,
        max_qty: text_to_amount(row, "max_qty")?,
        total: text_to_amount(row, "total")?,
        remaining: text_to_amount(row, "remaining")?,
        partial: get_bool(row, "partial")?,
        expire_at: get_u64(row, "expire_at")?,
        active: get_bool(row, "active")?,
        created_block: get_u64(row, "created_block")?,
        updated_block: get_u64(row, "updated_block")?,
    })
}

#[async_trait]
impl Projection for Order {
    const TABLE: &'static str = "orders";

    fn id(&self) -> &str {
        &self.id
    }

    async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, listing_id, maker, taker, price, qty, amount, state,
                   created_at, expire_at, created_block, updated_block
            FROM orders
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load order")?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, listing_id, maker, taker, price, qty, amount, state,
                created_at, expire_at, created_block, updated_block
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                listing_id = excluded.listing_id,
                maker = excluded.maker,
                taker = excluded.taker,
                price = excluded.price,
                qty = excluded.qty,
                amount = excluded.amount,
                state = excluded.state,
                created_at = excluded.created_at,
                expire_at = excluded.expire_at,
                created_block = excluded.created_block,
                updated_block = excluded.updated_block
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.listing_id.as_str())
        .bind(self.maker.as_str())
        .bind(self.taker.as_str())
        .bind(amount_to_text(self.price))
        .bind(amount_to_text(self.qty))
        .bind(amount_to_text(self.amount))
        .bind(self.state.as_str())
        .bind(self.created_at as i64)
        .bind(self.expire_at as i64)
        .bind(self.created_block as i64)
        .bind(self.updated_block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to upsert order")?;

        Ok(())
    }
}

fn row_to_order(row: &SqliteRow) -> Result<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        listing_id: row.try_get("listing_id")?,
        maker: row.try_get("maker")?,
        taker: row.try_get("taker")?,
        price: text_to_amount(row, "price")?,
        qty: text_to_amount(row, "qty")?,
        amount: text_to_amount(row, "amount")?,
        state: get_parsed(row, "state")?,
        created_at: get_u64(row, "created_at")?,
        expire_at: get_u64(row, "expire_at")?,
        created_block: get_u64(row, "created_block")?,
        updated_block: get_u64(row, "updated_block")?,
    })
}

#[async_trait]
impl Projection for ArbitrationCase {
    const TABLE: &'static str = "arbitration_cases";

    fn id(&self) -> &str {
        &self.id
    }

    async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, domain, object_id, state, opened_at, closed_at,
                   decision, bps, updated_block
            FROM arbitration_cases
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load arbitration case")?;

        row.as_ref().map(row_to_case).transpose()
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO arbitration_cases (
                id, domain, object_id, state, opened_at, closed_at,
                decision, bps, updated_block
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                domain = excluded.domain,
                object_id = excluded.object_id,
                state = excluded.state,
                opened_at = excluded.opened_at,
                closed_at = excluded.closed_at,
                decision = excluded.decision,
                bps = excluded.bps,
                updated_block = excluded.updated_block
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.domain.as_str())
        .bind(self.object_id as i64)
        .bind(self.state.as_str())
        .bind(self.opened_at as i64)
        .bind(self.closed_at.map(|v| v as i64))
        .bind(self.decision.map(|d| d.as_str()))
        .bind(self.bps.map(i64::from))
        .bind(self.updated_block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to upsert arbitration case")?;

        Ok(())
    }
}

fn row_to_case(row: &SqliteRow) -> Result<ArbitrationCase> {
    let decision: Option<String> = row.try_get("decision")?;
    let bps: Option<i64> = row.try_get("bps")?;

    Ok(ArbitrationCase {
        id: row.try_get("id")?,
        domain: row.try_get("domain")?,
        object_id: get_u64(row, "object_id")?,
        state: get_parsed(row, "state")?,
        opened_at: get_u64(row, "opened_at")?,
        closed_at: get_opt_u64(row, "closed_at")?,
        decision: decision.map(|d| d.parse::<Decision>()).transpose()?,
        bps: bps.map(|v| v as u32),
        updated_block: get_u64(row, "updated_block")?,
    })
}

#[async_trait]
impl Projection for ArbDailyStat {
    const TABLE: &'static str = "arb_daily_stats";

    fn id(&self) -> &str {
        &self.id
    }

    async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, day, disputes, arbitrated, release, refund, partial, updated_block
            FROM arb_daily_stats
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load daily stats")?;

        row.as_ref().map(row_to_daily_stat).transpose()
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO arb_daily_stats
                (id, day, disputes, arbitrated, release, refund, partial, updated_block)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                day = excluded.day,
                disputes = excluded.disputes,
                arbitrated = excluded.arbitrated,
                release = excluded.release,
                refund = excluded.refund,
                partial = excluded.partial,
                updated_block = excluded.updated_block
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.day as i64)
        .bind(self.disputes as i64)
        .bind(self.arbitrated as i64)
        .bind(self.release as i64)
        .bind(self.refund as i64)
        .bind(self.partial as i64)
        .bind(self.updated_block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to upsert daily stats")?;

        Ok(())
    }
}

pub(crate) fn row_to_daily_stat(row: &SqliteRow) -> Result<ArbDailyStat> {
    Ok(ArbDailyStat {
        id: row.try_get("id")?,
        day: get_u64(row, "day")?,
        disputes: get_u64(row, "disputes")?,
        arbitrated: get_u64(row, "arbitrated")?,
        release: get_u64(row, "release")?,
        refund: get_u64(row, "refund")?,
        partial: get_u64(row, "partial")?,
        updated_block: get_u64(row, "updated_block")?,
    })
}

#[async_trait]
impl Projection for GovCase {
    const TABLE: &'static str = "gov_cases";

    fn id(&self) -> &str {
        &self.id
    }

    async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, pallet, object_id, scope, object_key,
                   opened_at, last_action_at, evidence_cid
            FROM gov_cases
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load governance case")?;

        row.as_ref().map(row_to_gov_case).transpose()
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gov_cases (
                id, pallet, object_id, scope, object_key,
                opened_at, last_action_at, evidence_cid
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                pallet = excluded.pallet,
                object_id = excluded.object_id,
                scope = excluded.scope,
                object_key = excluded.object_key,
                opened_at = excluded.opened_at,
                last_action_at = excluded.last_action_at,
                evidence_cid = excluded.evidence_cid
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.pallet.as_str())
        .bind(self.object.packed() as i64)
        .bind(i64::from(self.object.scope().code()))
        .bind(self.object.key() as i64)
        .bind(self.opened_at as i64)
        .bind(self.last_action_at as i64)
        .bind(self.evidence_cid.as_deref())
        .execute(&mut *conn)
        .await
        .context("Failed to upsert governance case")?;

        Ok(())
    }
}

fn row_to_gov_case(row: &SqliteRow) -> Result<GovCase> {
    let scope = GovScope::from_code(row.try_get::<i64, _>("scope")? as u8)?;
    let object = GovObjectId::new(scope, get_u64(row, "object_key")?)?;

    Ok(GovCase {
        id: row.try_get("id")?,
        pallet: row.try_get("pallet")?,
        object,
        opened_at: get_u64(row, "opened_at")?,
        last_action_at: get_u64(row, "last_action_at")?,
        evidence_cid: row.try_get("evidence_cid")?,
    })
}

#[async_trait]
impl Projection for Grave {
    const TABLE: &'static str = "graves";

    fn id(&self) -> &str {
        &self.id
    }

    async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner, park_id, kind, primary_deceased_id, active,
                   offerings_count, offerings_amount, created_at, updated_block
            FROM graves
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load grave")?;

        row.as_ref().map(row_to_grave).transpose()
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO graves (
                id, owner, park_id, kind, primary_deceased_id, active,
                offerings_count, offerings_amount, created_at, updated_block
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                park_id = excluded.park_id,
                kind = excluded.kind,
                primary_deceased_id = excluded.primary_deceased_id,
                active = excluded.active,
                offerings_count = excluded.offerings_count,
                offerings_amount = excluded.offerings_amount,
                created_at = excluded.created_at,
                updated_block = excluded.updated_block
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.owner.as_str())
        .bind(self.park_id.map(|v| v as i64))
        .bind(self.kind.as_str())
        .bind(self.primary_deceased_id.map(|v| v as i64))
        .bind(self.active as i64)
        .bind(self.offerings_count as i64)
        .bind(amount_to_text(self.offerings_amount))
        .bind(self.created_at as i64)
        .bind(self.updated_block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to upsert grave")?;

        Ok(())
    }
}

fn row_to_grave(row: &SqliteRow) -> Result<Grave> {
    Ok(Grave {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        park_id: get_opt_u64(row, "park_id")?,
        kind: get_parsed(row, "kind")?,
        primary_deceased_id: get_opt_u64(row, "primary_deceased_id")?,
        active: get_bool(row, "active")?,
        offerings_count: get_u64(row, "offerings_count")?,
        offerings_amount: text_to_amount(row, "offerings_amount")?,
        created_at: get_u64(row, "created_at")?,
        updated_block: get_u64(row, "updated_block")?,
    })
}

#[async_trait]
impl Projection for PinOverview {
    const TABLE: &'static str = "pin_overviews";

    fn id(&self) -> &str {
        &self.id
    }

    async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, first_seen, owner, replicas, size_bytes, total_charged,
                   last_next_charge_at, last_state, updated_block
            FROM pin_overviews
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load pin overview")?;

        row.as_ref().map(row_to_pin_overview).transpose()
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pin_overviews (
                id, first_seen, owner, replicas, size_bytes, total_charged,
                last_next_charge_at, last_state, updated_block
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                first_seen = excluded.first_seen,
                owner = excluded.owner,
                replicas = excluded.replicas,
                size_bytes = excluded.size_bytes,
                total_charged = excluded.total_charged,
                last_next_charge_at = excluded.last_next_charge_at,
                last_state = excluded.last_state,
                updated_block = excluded.updated_block
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.first_seen as i64)
        .bind(self.owner.as_deref())
        .bind(i64::from(self.replicas))
        .bind(self.size_bytes as i64)
        .bind(amount_to_text(self.total_charged))
        .bind(self.last_next_charge_at.map(|v| v as i64))
        .bind(self.last_state.as_str())
        .bind(self.updated_block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to upsert pin overview")?;

        Ok(())
    }
}

fn row_to_pin_overview(row: &SqliteRow) -> Result<PinOverview> {
    Ok(PinOverview {
        id: row.try_get("id")?,
        first_seen: get_u64(row, "first_seen")?,
        owner: row.try_get("owner")?,
        replicas: row.try_get::<i64, _>("replicas")? as u32,
        size_bytes: get_u64(row, "size_bytes")?,
        total_charged: text_to_amount(row, "total_charged")?,
        last_next_charge_at: get_opt_u64(row, "last_next_charge_at")?,
        last_state: get_parsed(row, "last_state")?,
        updated_block: get_u64(row, "updated_block")?,
    })
}

#[async_trait]
impl Projection for ReferralCode {
    const TABLE: &'static str = "referral_codes";

    fn id(&self) -> &str {
        &self.id
    }

    async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner, claimed_at, updated_block
            FROM referral_codes
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load referral code")?;

        row.as_ref()
            .map(|row| -> Result<_> {
                Ok(ReferralCode {
                    id: row.try_get("id")?,
                    owner: row.try_get("owner")?,
                    claimed_at: get_u64(row, "claimed_at")?,
                    updated_block: get_u64(row, "updated_block")?,
                })
            })
            .transpose()
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO referral_codes (id, owner, claimed_at, updated_block)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                claimed_at = excluded.claimed_at,
                updated_block = excluded.updated_block
            "#,
        )
        .bind(self.id.as_str())
        .bind(self.owner.as_str())
        .bind(self.claimed_at as i64)
        .bind(self.updated_block as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to upsert referral code")?;

        Ok(())
    }
}
