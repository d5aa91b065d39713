//! Offering handlers, including the governed price table and pause switches.

use anyhow::Result;
use memopark_core::{ids, modules, GovObjectId, GovScope, OFFERING_DOMAIN_GRAVE};
use serde_json::json;
use tracing::warn;

use super::governance::{self, GovAction};
use super::{notify, EventCtx};
use crate::rollup;
use crate::storage::{Offering, OfferingPriceSnapshot, OfferingSettlement, StoreTx};

pub(super) async fn committed(tx: &mut StoreTx, ctx: &EventCtx, offering: Offering) -> Result<()> {
    let inserted = tx.append(&offering).await?.is_inserted();

    let target_id = offering.target_id.to_string();
    if inserted && offering.target_domain == u64::from(OFFERING_DOMAIN_GRAVE) {
        rollup::credit_grave(tx, &target_id, offering.amount, ctx.height).await?;
    }

    let meta = json!({
        "target_domain": offering.target_domain,
        "target": target_id,
        "amount": offering.amount.to_string(),
    });
    notify(tx, ctx, &offering.id, Some(&offering.who), Some(meta)).await
}

pub(super) async fn settled(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    offering_id: &str,
    recipient: Option<String>,
    amount: u128,
) -> Result<()> {
    let settlement = OfferingSettlement {
        id: ids::action_id(offering_id, "Settled", ctx.height),
        offering_id: offering_id.to_string(),
        recipient,
        amount,
        block: ctx.height,
        extrinsic_hash: ctx.extrinsic_hash,
    };
    tx.append(&settlement).await?;

    let meta = json!({ "amount": amount.to_string() });
    notify(tx, ctx, offering_id, settlement.recipient.as_deref(), Some(meta)).await
}

pub(super) async fn price_updated(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    kind_code: u64,
    fixed_price: Option<u128>,
    unit_price_per_week: Option<u128>,
) -> Result<()> {
    let snapshot = OfferingPriceSnapshot {
        id: ids::price_snapshot_id(kind_code, ctx.height),
        kind_code,
        fixed_price,
        unit_price_per_week,
        block: ctx.height,
    };
    tx.append(&snapshot).await?;

    let meta = json!({
        "fixed": fixed_price.map(|p| p.to_string()),
        "unit": unit_price_per_week.map(|p| p.to_string()),
    });

    match GovObjectId::new(GovScope::PriceKind, kind_code) {
        Ok(object) => {
            governance::record(
                tx,
                ctx,
                GovAction {
                    pallet: modules::MEMO_OFFERINGS,
                    object,
                    kind: "PriceUpdated",
                    meta: Some(meta.clone()),
                    evidence_cid: None,
                    repeatable: false,
                },
            )
            .await?;
        }
        Err(e) => warn!(kind_code, error = %e, "Price kind outside the governance key space"),
    }

    notify(tx, ctx, &kind_code.to_string(), None, Some(meta)).await
}

pub(super) async fn params_updated(tx: &mut StoreTx, ctx: &EventCtx) -> Result<()> {
    let id = governance::record(
        tx,
        ctx,
        GovAction {
            pallet: modules::MEMO_OFFERINGS,
            object: GovObjectId::singleton(GovScope::GlobalParams),
            kind: "ParamsUpdated",
            meta: None,
            evidence_cid: None,
            repeatable: false,
        },
    )
    .await?;
    notify(tx, ctx, &id, None, None).await
}

/// Global switch when `domain` is `None`, otherwise the switch of one domain.
pub(super) async fn pause_set(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    domain: Option<u64>,
    paused: bool,
) -> Result<()> {
    let object = match domain {
        None => GovObjectId::singleton(GovScope::GlobalPause),
        Some(domain) => match GovObjectId::new(GovScope::DomainPause, domain) {
            Ok(object) => object,
            Err(e) => {
                warn!(domain, error = %e, "Pause domain outside the governance key space");
                return Ok(());
            }
        },
    };

    let meta = json!({ "paused": paused, "domain": domain });
    let id = governance::record(
        tx,
        ctx,
        GovAction {
            pallet: modules::MEMO_OFFERINGS,
            object,
            kind: "PauseSet",
            meta: Some(meta.clone()),
            evidence_cid: None,
            repeatable: false,
        },
    )
    .await?;
    notify(tx, ctx, &id, None, Some(meta)).await
}
