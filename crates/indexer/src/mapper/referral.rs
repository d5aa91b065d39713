//! Referral handlers.

use anyhow::Result;
use memopark_core::ids;

use super::{notify, EventCtx};
use crate::storage::{ReferralCode, ReferralLink, StoreTx};

pub(super) async fn sponsor_bound(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    who: String,
    sponsor: String,
) -> Result<()> {
    let link = ReferralLink {
        id: ids::referral_link_id(&who, &sponsor),
        who,
        sponsor,
        block: ctx.height,
    };
    tx.append(&link).await?;
    notify(tx, ctx, &link.who, Some(&link.sponsor), None).await
}

/// A re-claimed code changes owner but keeps its first claim block.
pub(super) async fn code_claimed(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    who: String,
    code: String,
) -> Result<()> {
    let claimed_at = tx
        .find::<ReferralCode>(&code)
        .await?
        .map(|existing| existing.claimed_at)
        .unwrap_or(ctx.height);

    let row = ReferralCode {
        id: code,
        owner: who,
        claimed_at,
        updated_block: ctx.height,
    };
    tx.upsert(&row).await?;
    notify(tx, ctx, &row.id, Some(&row.owner), None).await
}
