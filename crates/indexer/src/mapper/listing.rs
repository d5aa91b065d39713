//! OTC listing handlers.

use anyhow::Result;
use serde_json::json;
use tracing::debug;

use super::{notify, EventCtx};
use crate::events::ListingClose;
use crate::storage::{ActionLog, Listing, StoreTx};

pub(super) async fn created(tx: &mut StoreTx, ctx: &EventCtx, listing: Listing) -> Result<()> {
    let action = ctx.action(ActionLog::Listing, &listing.id, "Created", None);
    tx.apply_transition(Some(&listing), &action).await?;
    notify(tx, ctx, &listing.id, Some(&listing.maker), None).await
}

pub(super) async fn matched(tx: &mut StoreTx, ctx: &EventCtx, id: &str, qty: u128) -> Result<()> {
    let next = tx.find::<Listing>(id).await?.map(|mut listing| {
        listing.remaining = listing.remaining.saturating_sub(qty);
        listing.active = listing.active && listing.remaining > 0;
        listing.updated_block = ctx.height;
        listing
    });
    if next.is_none() {
        debug!(listing = id, "Match on unknown listing; recording action only");
    }

    let meta = json!({ "qty": qty.to_string() });
    let action = ctx.indexed_action(ActionLog::Listing, id, "Matched", Some(meta.clone()));
    tx.apply_transition(next.as_ref(), &action).await?;
    notify(tx, ctx, id, None, Some(meta)).await
}

pub(super) async fn closed(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    id: &str,
    how: ListingClose,
) -> Result<()> {
    let next = tx.find::<Listing>(id).await?.map(|mut listing| {
        listing.active = false;
        listing.updated_block = ctx.height;
        listing
    });
    if next.is_none() {
        debug!(listing = id, how = how.as_str(), "Close of unknown listing");
    }

    let action = ctx.action(ActionLog::Listing, id, how.as_str(), None);
    tx.apply_transition(next.as_ref(), &action).await?;
    notify(tx, ctx, id, None, None).await
}
