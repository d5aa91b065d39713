//! Block mapper: folds the events of one block into the store.
//!
//! Events are applied strictly by `index_in_block`. Each decoded event goes
//! to exactly one handler; unknown signatures are ignored and malformed
//! payloads are skipped with a warning. All writes of a block, including the
//! checkpoint, share one transaction.

use alloy_primitives::B256;
use anyhow::{Context, Result};
use memopark_core::ids;
use tracing::{debug, trace, warn};

use crate::events::{EventTag, MappedEvent};
use crate::source::{Block, ChainEvent};
use crate::storage::{ActionLog, ActionRecord, BlockRecord, Notification, Storage, StoreTx};

mod arbitration;
mod governance;
mod grave;
mod listing;
mod memorial;
mod offering;
mod order;
mod pin;
mod referral;

/// What happened to one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReport {
    /// Block height.
    pub height: u64,
    /// Events delivered.
    pub events: u64,
    /// Events that reached a handler.
    pub applied: u64,
    /// Events skipped as malformed.
    pub skipped: u64,
    /// Events with no handler.
    pub ignored: u64,
    /// The block was at or below the checkpoint and left untouched.
    pub already_applied: bool,
}

/// Position and provenance of the event being applied.
#[derive(Debug, Clone)]
pub(crate) struct EventCtx {
    pub height: u64,
    pub index: u32,
    pub extrinsic_hash: Option<B256>,
    pub tag: EventTag,
}

impl EventCtx {
    fn new(height: u64, event: &ChainEvent) -> Self {
        Self {
            height,
            index: event.index_in_block,
            extrinsic_hash: event.extrinsic_hash,
            tag: EventTag::of(event),
        }
    }

    /// History row `{entity}-{kind}-{height}`.
    pub fn action(
        &self,
        log: ActionLog,
        entity_ref: &str,
        kind: &str,
        meta: Option<serde_json::Value>,
    ) -> ActionRecord {
        ActionRecord {
            log,
            id: ids::action_id(entity_ref, kind, self.height),
            entity_ref: entity_ref.to_string(),
            kind: kind.to_string(),
            block: self.height,
            index_in_block: self.index,
            extrinsic_hash: self.extrinsic_hash,
            meta: meta.map(|m| m.to_string()),
        }
    }

    /// History row for kinds that may repeat within one block; the id
    /// carries the in-block index.
    pub fn indexed_action(
        &self,
        log: ActionLog,
        entity_ref: &str,
        kind: &str,
        meta: Option<serde_json::Value>,
    ) -> ActionRecord {
        ActionRecord {
            id: ids::indexed_action_id(entity_ref, kind, self.height, self.index),
            ..self.action(log, entity_ref, kind, meta)
        }
    }

    /// Notification feed row for this event.
    pub fn notification(
        &self,
        ref_id: &str,
        actor: Option<&str>,
        meta: Option<serde_json::Value>,
    ) -> Notification {
        Notification {
            id: ids::notification_id(self.height, self.index),
            module: self.tag.module.clone(),
            kind: self.tag.name.clone(),
            ref_id: ref_id.to_string(),
            actor: actor.map(str::to_string),
            block: self.height,
            extrinsic_hash: self.extrinsic_hash,
            meta: meta.map(|m| m.to_string()),
        }
    }
}

/// Append the feed row of the current event.
pub(crate) async fn notify(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    ref_id: &str,
    actor: Option<&str>,
    meta: Option<serde_json::Value>,
) -> Result<()> {
    tx.append(&ctx.notification(ref_id, actor, meta)).await?;
    Ok(())
}

/// Applies blocks to a [`Storage`].
#[derive(Debug, Clone)]
pub struct Mapper {
    blocks_per_day: u64,
}

impl Mapper {
    /// Mapper bucketing daily statistics by `blocks_per_day`.
    pub fn new(blocks_per_day: u64) -> Result<Self> {
        if blocks_per_day == 0 {
            anyhow::bail!("blocks_per_day must be non-zero");
        }
        Ok(Self { blocks_per_day })
    }

    /// Blocks per daily statistics bucket.
    pub fn blocks_per_day(&self) -> u64 {
        self.blocks_per_day
    }

    /// Apply one block atomically.
    ///
    /// Blocks at or below the checkpoint are reported as already applied.
    /// A parent hash that contradicts the stored chain fails with
    /// [`crate::error::ReorgDetected`]; an append-only id collision fails
    /// with [`crate::error::AppendConflict`]. Either way nothing of the block
    /// is written.
    pub async fn apply_block(&self, storage: &Storage, block: &Block) -> Result<BlockReport> {
        let mut report = BlockReport {
            height: block.height,
            events: block.events.len() as u64,
            ..Default::default()
        };

        let mut tx = storage.begin().await?;

        if let Some(last) = tx.sync_state().await?.last_block_number {
            if block.height <= last {
                debug!(height = block.height, checkpoint = last, "Block already applied");
                report.already_applied = true;
                return Ok(report);
            }
        }

        tx.check_parent(block.height, block.parent_hash).await?;

        let mut events: Vec<&ChainEvent> = block.events.iter().collect();
        events.sort_by_key(|e| e.index_in_block);

        for event in events {
            let ctx = EventCtx::new(block.height, event);

            match MappedEvent::decode(event) {
                Ok(Some(mapped)) => {
                    self.dispatch(&mut tx, &ctx, mapped)
                        .await
                        .with_context(|| {
                            format!("Failed to apply {} at {}/{}", ctx.tag, ctx.height, ctx.index)
                        })?;
                    report.applied += 1;
                }
                Ok(None) => {
                    trace!(height = ctx.height, index = ctx.index, tag = %ctx.tag, "No handler");
                    report.ignored += 1;
                }
                Err(e) => {
                    warn!(
                        height = ctx.height,
                        index = ctx.index,
                        tag = %ctx.tag,
                        error = %e,
                        "Skipping malformed event"
                    );
                    report.skipped += 1;
                }
            }
        }

        tx.finish_block(&BlockRecord {
            block_number: block.height,
            block_hash: block.hash,
            parent_hash: block.parent_hash,
            event_count: report.events,
            applied: report.applied,
            skipped: report.skipped,
            indexed_at: chrono::Utc::now().timestamp(),
        })
        .await?;

        tx.commit().await?;

        debug!(
            height = report.height,
            applied = report.applied,
            skipped = report.skipped,
            ignored = report.ignored,
            "Block committed"
        );

        Ok(report)
    }

    async fn dispatch(&self, tx: &mut StoreTx, ctx: &EventCtx, event: MappedEvent) -> Result<()> {
        match event {
            MappedEvent::ListingCreated {
                id,
                maker,
                side,
                base,
                quote,
                price,
                min_qty,
                max_qty,
                total,
                remaining,
                partial,
                expire_at,
            } => {
                let listing = crate::storage::Listing {
                    id,
                    maker,
                    side,
                    base,
                    quote,
                    price,
                    min_qty,
                    max_qty,
                    total,
                    remaining,
                    partial,
                    expire_at,
                    active: true,
                    created_block: ctx.height,
                    updated_block: ctx.height,
                };
                listing::created(tx, ctx, listing).await
            }
            MappedEvent::ListingMatched { id, qty } => listing::matched(tx, ctx, &id, qty).await,
            MappedEvent::ListingClosed { id, how } => listing::closed(tx, ctx, &id, how).await,

            MappedEvent::OrderOpened {
                id,
                listing_id,
                maker,
                taker,
                price,
                qty,
                amount,
                created_at,
                expire_at,
            } => {
                let order = crate::storage::Order {
                    id,
                    listing_id,
                    maker,
                    taker,
                    price,
                    qty,
                    amount,
                    state: memopark_core::OrderState::Created,
                    created_at,
                    expire_at,
                    created_block: ctx.height,
                    updated_block: ctx.height,
                };
                order::opened(tx, ctx, order).await
            }
            MappedEvent::OrderStateChanged { id, state } => {
                order::state_changed(tx, ctx, &id, state).await
            }
            MappedEvent::OrderRevealed { id, what } => order::revealed(tx, ctx, &id, what).await,

            MappedEvent::Disputed { domain, object_id } => {
                arbitration::disputed(tx, ctx, self.blocks_per_day, &domain, object_id).await
            }
            MappedEvent::Arbitrated {
                domain,
                object_id,
                decision,
                bps,
            } => {
                let verdict = arbitration::Verdict { decision, bps };
                arbitration::arbitrated(tx, ctx, self.blocks_per_day, &domain, object_id, verdict)
                    .await
            }

            MappedEvent::GraveCreated {
                id,
                owner,
                park_id,
                kind,
            } => grave::created(tx, ctx, &id, owner, park_id, kind).await,
            MappedEvent::GraveLinkedDeceased { id, deceased_id } => {
                grave::linked_deceased(tx, ctx, &id, deceased_id).await
            }
            MappedEvent::GraveSetPark { id, park_id } => {
                grave::set_park(tx, ctx, &id, park_id).await
            }
            MappedEvent::GraveTransferred { id, new_owner } => {
                grave::transferred(tx, ctx, &id, new_owner).await
            }

            MappedEvent::OfferingCommitted {
                id,
                target_domain,
                target_id,
                who,
                amount,
                kind_code,
            } => {
                let offering = crate::storage::Offering {
                    id,
                    target_domain,
                    target_id,
                    who,
                    kind_code,
                    amount,
                    block: ctx.height,
                };
                offering::committed(tx, ctx, offering).await
            }
            MappedEvent::OfferingSettled { id, to, amount } => {
                offering::settled(tx, ctx, &id, to, amount).await
            }
            MappedEvent::OfferingPriceUpdated {
                kind_code,
                fixed_price,
                unit_price_per_week,
            } => offering::price_updated(tx, ctx, kind_code, fixed_price, unit_price_per_week).await,
            MappedEvent::OfferParamsUpdated => offering::params_updated(tx, ctx).await,
            MappedEvent::PausedGlobalSet { paused } => {
                offering::pause_set(tx, ctx, None, paused).await
            }
            MappedEvent::PausedByDomainSet { domain, paused } => {
                offering::pause_set(tx, ctx, Some(domain), paused).await
            }

            MappedEvent::Appeal { id, stage, who } => {
                governance::appeal(tx, ctx, id, stage, who.as_deref()).await
            }
            MappedEvent::GovEvidenceNoted { object, cid } => {
                governance::evidence_noted(tx, ctx, object, cid).await
            }

            MappedEvent::PinRequested {
                cid,
                payer,
                replicas,
                size_bytes,
                price,
            } => pin::requested(tx, ctx, &cid, payer, replicas, size_bytes, price).await,
            MappedEvent::PinMarkedPinned { cid, replicas } => {
                pin::advance(tx, ctx, &cid, pin::Step::pinned(replicas)).await
            }
            MappedEvent::PinCharged {
                cid,
                amount,
                next_charge_at,
            } => pin::advance(tx, ctx, &cid, pin::Step::charged(amount, next_charge_at)).await,
            MappedEvent::PinGrace {
                cid,
                next_charge_at,
            } => pin::advance(tx, ctx, &cid, pin::Step::grace(next_charge_at)).await,
            MappedEvent::PinExpired { cid } => pin::advance(tx, ctx, &cid, pin::Step::expired()).await,

            MappedEvent::SponsorBound { who, sponsor } => {
                referral::sponsor_bound(tx, ctx, who, sponsor).await
            }
            MappedEvent::CodeClaimed { who, code } => {
                referral::code_claimed(tx, ctx, who, code).await
            }

            MappedEvent::MessagePosted {
                grave_id,
                message_id,
                who,
            } => memorial::message_posted(tx, ctx, grave_id, message_id, who).await,
            MappedEvent::MediaAdded { media_id, album_id } => {
                memorial::media_added(tx, ctx, media_id, album_id).await
            }
        }
    }
}
