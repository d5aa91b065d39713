//! Guestbook and media handlers.

use anyhow::Result;
use serde_json::json;

use super::{notify, EventCtx};
use crate::storage::{GuestbookMessage, MediaItem, StoreTx};

pub(super) async fn message_posted(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    grave_id: u64,
    message_id: String,
    who: String,
) -> Result<()> {
    let message = GuestbookMessage {
        id: message_id,
        grave_id,
        who,
        block: ctx.height,
    };
    tx.append(&message).await?;

    let meta = json!({ "graveId": grave_id });
    notify(tx, ctx, &message.id, Some(&message.who), Some(meta)).await
}

pub(super) async fn media_added(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    media_id: String,
    album_id: u64,
) -> Result<()> {
    let item = MediaItem {
        id: media_id,
        album_id,
        block: ctx.height,
    };
    tx.append(&item).await?;

    let meta = json!({ "albumId": album_id });
    notify(tx, ctx, &item.id, None, Some(meta)).await
}
