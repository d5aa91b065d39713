//! Governance handlers.
//!
//! Governance cases are never created explicitly: the first event naming a
//! `(pallet, object)` pair opens the case, later ones advance
//! `last_action_at`.

use anyhow::Result;
use memopark_core::{ids, modules, GovObjectId, GovScope};
use serde_json::json;
use tracing::warn;

use super::{notify, EventCtx};
use crate::events::AppealStage;
use crate::storage::{ActionLog, GovCase, StoreTx};

/// One governance action against a case.
pub(super) struct GovAction<'a> {
    pub pallet: &'a str,
    pub object: GovObjectId,
    pub kind: &'a str,
    pub meta: Option<serde_json::Value>,
    pub evidence_cid: Option<String>,
    /// Kind may repeat within a block.
    pub repeatable: bool,
}

/// Open or touch the case and record the action. Returns the case id.
pub(super) async fn record(tx: &mut StoreTx, ctx: &EventCtx, act: GovAction<'_>) -> Result<String> {
    let id = ids::gov_case_id(act.pallet, &act.object);

    let case = match tx.find::<GovCase>(&id).await? {
        Some(mut case) => {
            case.last_action_at = ctx.height;
            if act.evidence_cid.is_some() {
                case.evidence_cid = act.evidence_cid;
            }
            case
        }
        None => GovCase {
            id: id.clone(),
            pallet: act.pallet.to_string(),
            object: act.object,
            opened_at: ctx.height,
            last_action_at: ctx.height,
            evidence_cid: act.evidence_cid,
        },
    };

    let action = if act.repeatable {
        ctx.indexed_action(ActionLog::Gov, &id, act.kind, act.meta)
    } else {
        ctx.action(ActionLog::Gov, &id, act.kind, act.meta)
    };
    tx.apply_transition(Some(&case), &action).await?;

    Ok(id)
}

pub(super) async fn appeal(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    appeal_id: u64,
    stage: AppealStage,
    who: Option<&str>,
) -> Result<()> {
    let object = match GovObjectId::new(GovScope::Passthrough, appeal_id) {
        Ok(object) => object,
        Err(e) => {
            warn!(appeal = appeal_id, error = %e, "Skipping appeal outside the governance key space");
            return Ok(());
        }
    };
    let id = record(
        tx,
        ctx,
        GovAction {
            pallet: modules::MEMO_CONTENT_GOVERNANCE,
            object,
            kind: stage.as_str(),
            meta: who.map(|w| json!({ "who": w })),
            evidence_cid: None,
            repeatable: false,
        },
    )
    .await?;
    notify(tx, ctx, &id, who, None).await
}

pub(super) async fn evidence_noted(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    object: GovObjectId,
    cid: String,
) -> Result<()> {
    let meta = json!({ "cid": cid });
    let id = record(
        tx,
        ctx,
        GovAction {
            pallet: modules::MEMO_CONTENT_GOVERNANCE,
            object,
            kind: "EvidenceNoted",
            meta: Some(meta.clone()),
            evidence_cid: Some(cid),
            repeatable: true,
        },
    )
    .await?;
    notify(tx, ctx, &id, None, Some(meta)).await
}
