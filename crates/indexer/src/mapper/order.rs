//! OTC order handlers.

use anyhow::Result;
use memopark_core::OrderState;
use tracing::debug;

use super::{notify, EventCtx};
use crate::events::Reveal;
use crate::storage::{ActionLog, Order, StoreTx};

pub(super) async fn opened(tx: &mut StoreTx, ctx: &EventCtx, order: Order) -> Result<()> {
    let action = ctx.action(ActionLog::Order, &order.id, "Opened", None);
    tx.apply_transition(Some(&order), &action).await?;
    notify(tx, ctx, &order.id, Some(&order.taker), None).await
}

pub(super) async fn state_changed(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    id: &str,
    state: OrderState,
) -> Result<()> {
    let next = tx.find::<Order>(id).await?.map(|mut order| {
        order.state = state;
        order.updated_block = ctx.height;
        order
    });
    if next.is_none() {
        debug!(order = id, state = state.as_str(), "State change of unknown order");
    }

    let action = ctx.action(ActionLog::Order, id, state.as_str(), None);
    tx.apply_transition(next.as_ref(), &action).await?;
    notify(tx, ctx, id, None, None).await
}

/// Reveals are history only; the order row does not change.
pub(super) async fn revealed(tx: &mut StoreTx, ctx: &EventCtx, id: &str, what: Reveal) -> Result<()> {
    let action = ctx.action(ActionLog::Order, id, what.as_str(), None);
    tx.apply_transition::<Order, _>(None, &action).await?;
    notify(tx, ctx, id, None, None).await
}
