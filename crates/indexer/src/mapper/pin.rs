//! Pin billing handlers.

use anyhow::Result;
use memopark_core::{ids, PinState};
use serde_json::json;

use super::{notify, EventCtx};
use crate::rollup;
use crate::storage::{PinBillingEvent, PinOverview, StoreTx};

/// A billing step after the initial request.
#[derive(Debug, Clone, Copy)]
pub(super) struct Step {
    kind: &'static str,
    state: PinState,
    charge: Option<u128>,
    next_charge_at: Option<u64>,
    replicas: Option<u32>,
}

impl Step {
    pub fn pinned(replicas: Option<u32>) -> Self {
        Self {
            kind: "Pinned",
            state: PinState::Active,
            charge: None,
            next_charge_at: None,
            replicas,
        }
    }

    pub fn charged(amount: u128, next_charge_at: Option<u64>) -> Self {
        Self {
            kind: "Charged",
            state: PinState::Active,
            charge: Some(amount),
            next_charge_at,
            replicas: None,
        }
    }

    pub fn grace(next_charge_at: Option<u64>) -> Self {
        Self {
            kind: "Grace",
            state: PinState::Grace,
            charge: None,
            next_charge_at,
            replicas: None,
        }
    }

    pub fn expired() -> Self {
        Self {
            kind: "Expired",
            state: PinState::Expired,
            charge: None,
            next_charge_at: None,
            replicas: None,
        }
    }
}

fn first_seen(ctx: &EventCtx, cid: &str) -> PinOverview {
    PinOverview {
        id: cid.to_string(),
        first_seen: ctx.height,
        owner: None,
        replicas: 0,
        size_bytes: 0,
        total_charged: 0,
        last_next_charge_at: None,
        last_state: PinState::Requested,
        updated_block: ctx.height,
    }
}

fn billing_event(
    ctx: &EventCtx,
    cid: &str,
    kind: &str,
    amount: Option<u128>,
    next_charge_at: Option<u64>,
) -> PinBillingEvent {
    PinBillingEvent {
        id: ids::action_id(cid, kind, ctx.height),
        cid: cid.to_string(),
        kind: kind.to_string(),
        amount,
        next_charge_at,
        block: ctx.height,
        index_in_block: ctx.index,
        extrinsic_hash: ctx.extrinsic_hash,
    }
}

pub(super) async fn requested(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    cid: &str,
    payer: String,
    replicas: u32,
    size_bytes: u64,
    price: u128,
) -> Result<()> {
    let mut overview = tx
        .find::<PinOverview>(cid)
        .await?
        .unwrap_or_else(|| first_seen(ctx, cid));
    overview.owner = Some(payer);
    overview.replicas = replicas;
    overview.size_bytes = size_bytes;
    overview.updated_block = ctx.height;

    let event = billing_event(ctx, cid, "Requested", Some(price), None);
    tx.apply_transition(Some(&overview), &event).await?;

    let meta = json!({ "replicas": replicas, "price": price.to_string() });
    notify(tx, ctx, cid, overview.owner.as_deref(), Some(meta)).await
}

pub(super) async fn advance(tx: &mut StoreTx, ctx: &EventCtx, cid: &str, step: Step) -> Result<()> {
    let mut overview = tx
        .find::<PinOverview>(cid)
        .await?
        .unwrap_or_else(|| first_seen(ctx, cid));

    rollup::step_pin(&mut overview, step.state);
    if let Some(amount) = step.charge {
        rollup::add_charge(&mut overview, amount);
    }
    if step.next_charge_at.is_some() {
        overview.last_next_charge_at = step.next_charge_at;
    }
    if let Some(replicas) = step.replicas {
        overview.replicas = replicas;
    }
    overview.updated_block = ctx.height;

    let event = billing_event(ctx, cid, step.kind, step.charge, step.next_charge_at);
    tx.apply_transition(Some(&overview), &event).await?;

    let meta = step.charge.map(|amount| json!({ "amount": amount.to_string() }));
    notify(tx, ctx, cid, overview.owner.as_deref(), meta).await
}
