//! Grave (memorial hall) handlers.

use anyhow::Result;
use memopark_core::GraveKind;
use serde_json::json;
use tracing::debug;

use super::{notify, EventCtx};
use crate::storage::{ActionLog, Grave, StoreTx};

pub(super) async fn created(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    id: &str,
    owner: String,
    park_id: Option<u64>,
    kind: u64,
) -> Result<()> {
    // A repeated create keeps the offerings already counted.
    let (offerings_count, offerings_amount) = match tx.find::<Grave>(id).await? {
        Some(existing) => (existing.offerings_count, existing.offerings_amount),
        None => (0, 0),
    };

    let grave = Grave {
        id: id.to_string(),
        owner,
        park_id,
        kind: GraveKind::from_code(kind),
        primary_deceased_id: None,
        active: true,
        offerings_count,
        offerings_amount,
        created_at: ctx.height,
        updated_block: ctx.height,
    };

    let action = ctx.action(ActionLog::Grave, id, "Created", None);
    tx.apply_transition(Some(&grave), &action).await?;
    notify(tx, ctx, id, Some(&grave.owner), None).await
}

async fn update<F>(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    id: &str,
    kind: &str,
    meta: serde_json::Value,
    f: F,
) -> Result<()>
where
    F: FnOnce(&mut Grave),
{
    let next = tx.find::<Grave>(id).await?.map(|mut grave| {
        f(&mut grave);
        grave.updated_block = ctx.height;
        grave
    });
    if next.is_none() {
        debug!(grave = id, kind, "Update of unknown grave");
    }

    let action = ctx.action(ActionLog::Grave, id, kind, Some(meta));
    tx.apply_transition(next.as_ref(), &action).await?;
    Ok(())
}

pub(super) async fn linked_deceased(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    id: &str,
    deceased_id: u64,
) -> Result<()> {
    let meta = json!({ "deceased_id": deceased_id });
    update(tx, ctx, id, "LinkedDeceased", meta, |grave| {
        grave.primary_deceased_id = Some(deceased_id);
    })
    .await
}

pub(super) async fn set_park(tx: &mut StoreTx, ctx: &EventCtx, id: &str, park_id: u64) -> Result<()> {
    let meta = json!({ "park_id": park_id });
    update(tx, ctx, id, "SetPark", meta, |grave| grave.park_id = Some(park_id)).await
}

pub(super) async fn transferred(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    id: &str,
    new_owner: String,
) -> Result<()> {
    let meta = json!({ "new_owner": new_owner });
    let owner = new_owner.clone();
    update(tx, ctx, id, "Transferred", meta, move |grave| grave.owner = owner).await?;
    notify(tx, ctx, id, Some(&new_owner), None).await
}
