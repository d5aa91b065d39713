//! Arbitration handlers.
//!
//! A case is opened by its first dispute, or lazily by a decision that
//! arrives without one, and is closed exactly once.

use anyhow::Result;
use memopark_core::{ids, CaseState, Decision};
use serde_json::json;
use tracing::warn;

use super::{notify, EventCtx};
use crate::rollup::{self, ArbTally};
use crate::storage::{ActionLog, ArbitrationCase, StoreTx};

pub(super) struct Verdict {
    pub decision: Decision,
    pub bps: Option<u32>,
}

fn open_case(ctx: &EventCtx, id: &str, domain: &str, object_id: u64) -> ArbitrationCase {
    ArbitrationCase {
        id: id.to_string(),
        domain: domain.to_string(),
        object_id,
        state: CaseState::Disputed,
        opened_at: ctx.height,
        closed_at: None,
        decision: None,
        bps: None,
        updated_block: ctx.height,
    }
}

pub(super) async fn disputed(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    blocks_per_day: u64,
    domain: &str,
    object_id: u64,
) -> Result<()> {
    let id = ids::case_id(domain, object_id);
    let case = match tx.find::<ArbitrationCase>(&id).await? {
        Some(mut existing) => {
            existing.updated_block = ctx.height;
            existing
        }
        None => open_case(ctx, &id, domain, object_id),
    };

    let action = ctx.action(ActionLog::Arbitration, &id, "Disputed", None);
    if tx.apply_transition(Some(&case), &action).await?.is_inserted() {
        rollup::tally_arbitration(tx, ctx.height, blocks_per_day, ArbTally::Dispute).await?;
    }

    notify(tx, ctx, &id, None, Some(json!({ "domain": domain, "object_id": object_id }))).await
}

pub(super) async fn arbitrated(
    tx: &mut StoreTx,
    ctx: &EventCtx,
    blocks_per_day: u64,
    domain: &str,
    object_id: u64,
    verdict: Verdict,
) -> Result<()> {
    let id = ids::case_id(domain, object_id);
    let existing = tx.find::<ArbitrationCase>(&id).await?;

    let next = match existing {
        Some(case) if case.state == CaseState::Closed => {
            warn!(case = %id, closed_at = ?case.closed_at, "Decision on a closed case; keeping the first");
            None
        }
        other => {
            let mut case = other.unwrap_or_else(|| open_case(ctx, &id, domain, object_id));
            case.state = CaseState::Closed;
            case.closed_at = Some(ctx.height);
            case.decision = Some(verdict.decision);
            case.bps = verdict.bps;
            case.updated_block = ctx.height;
            Some(case)
        }
    };

    let meta = json!({ "decision": verdict.decision.as_str(), "bps": verdict.bps });
    let action = ctx.action(ActionLog::Arbitration, &id, "Arbitrated", Some(meta.clone()));
    if tx.apply_transition(next.as_ref(), &action).await?.is_inserted() {
        let tally = ArbTally::Decided(verdict.decision);
        rollup::tally_arbitration(tx, ctx.height, blocks_per_day, tally).await?;
    }

    notify(tx, ctx, &id, None, Some(meta)).await
}
