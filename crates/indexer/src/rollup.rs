//! Aggregates maintained next to the projections.
//!
//! Every function here runs inside the block transaction and is only called
//! after the history row that justifies it was freshly inserted, so a replay
//! never counts twice.

use anyhow::Result;
use memopark_core::{ids, Decision, PinState};
use tracing::{debug, warn};

use crate::storage::{ArbDailyStat, Grave, PinOverview, StoreTx};

/// One contribution to the daily arbitration counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbTally {
    /// A dispute was opened.
    Dispute,
    /// A decision was recorded.
    Decided(Decision),
}

/// Add `tally` to the bucket of the day containing `height`.
pub async fn tally_arbitration(
    tx: &mut StoreTx,
    height: u64,
    blocks_per_day: u64,
    tally: ArbTally,
) -> Result<ArbDailyStat> {
    let day = ids::day_key(height, blocks_per_day)?;
    let id = day.to_string();

    let mut stat = tx
        .find::<ArbDailyStat>(&id)
        .await?
        .unwrap_or_else(|| ArbDailyStat {
            id: id.clone(),
            day,
            ..Default::default()
        });

    stat.updated_block = height;
    match tally {
        ArbTally::Dispute => stat.disputes += 1,
        ArbTally::Decided(decision) => {
            stat.arbitrated += 1;
            match decision {
                Decision::Release => stat.release += 1,
                Decision::Refund => stat.refund += 1,
                Decision::Partial => stat.partial += 1,
            }
        }
    }

    tx.upsert(&stat).await?;
    Ok(stat)
}

/// Count an offering toward its grave. Returns false for an unknown grave.
pub async fn credit_grave(
    tx: &mut StoreTx,
    grave_id: &str,
    amount: u128,
    height: u64,
) -> Result<bool> {
    let Some(mut grave) = tx.find::<Grave>(grave_id).await? else {
        debug!(grave = grave_id, "Offering to unknown grave; counters untouched");
        return Ok(false);
    };

    grave.offerings_count += 1;
    grave.offerings_amount = grave.offerings_amount.saturating_add(amount);
    grave.updated_block = height;
    tx.upsert(&grave).await?;
    Ok(true)
}

/// Move a pin to `next` if the billing state machine allows it.
///
/// A disallowed step keeps the current state; the event is still recorded
/// by the caller.
pub fn step_pin(overview: &mut PinOverview, next: PinState) -> bool {
    if overview.last_state.can_transition(next) {
        overview.last_state = next;
        true
    } else {
        warn!(
            cid = %overview.id,
            from = overview.last_state.as_str(),
            to = next.as_str(),
            "Ignoring invalid pin state transition"
        );
        false
    }
}

/// Add a charge to the running total.
pub fn add_charge(overview: &mut PinOverview, amount: u128) {
    overview.total_charged = overview.total_charged.saturating_add(amount);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::setup_storage;
    use memopark_core::GraveKind;

    fn overview(state: PinState) -> PinOverview {
        PinOverview {
            id: "0xaa".to_string(),
            first_seen: 1,
            owner: None,
            replicas: 1,
            size_bytes: 0,
            total_charged: 0,
            last_next_charge_at: None,
            last_state: state,
            updated_block: 1,
        }
    }

    #[tokio::test]
    async fn test_tally_buckets_by_day() {
        let (storage, _temp_db) = setup_storage().await;
        let mut tx = storage.begin().await.unwrap();

        tally_arbitration(&mut tx, 10, 100, ArbTally::Dispute).await.unwrap();
        tally_arbitration(&mut tx, 99, 100, ArbTally::Dispute).await.unwrap();
        tally_arbitration(&mut tx, 99, 100, ArbTally::Decided(Decision::Refund))
            .await
            .unwrap();
        let next_day = tally_arbitration(&mut tx, 100, 100, ArbTally::Decided(Decision::Partial))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let day0 = storage.find::<ArbDailyStat>("0").await.unwrap().unwrap();
        assert_eq!(day0.disputes, 2);
        assert_eq!(day0.arbitrated, 1);
        assert_eq!(day0.refund, 1);
        assert_eq!(day0.release + day0.partial, 0);

        assert_eq!(day0.updated_block, 99);
        assert_eq!(next_day.day, 1);
        assert_eq!(next_day.disputes, 0);
        assert_eq!(next_day.partial, 1);
    }

    #[tokio::test]
    async fn test_tally_rejects_zero_day_length() {
        let (storage, _temp_db) = setup_storage().await;
        let mut tx = storage.begin().await.unwrap();
        assert!(tally_arbitration(&mut tx, 10, 0, ArbTally::Dispute).await.is_err());
    }

    #[tokio::test]
    async fn test_credit_grave() {
        let (storage, _temp_db) = setup_storage().await;
        let mut tx = storage.begin().await.unwrap();

        assert!(!credit_grave(&mut tx, "42", 10, 5).await.unwrap());

        tx.upsert(&Grave {
            id: "42".to_string(),
            owner: "alice".to_string(),
            park_id: None,
            kind: GraveKind::Person,
            primary_deceased_id: None,
            active: true,
            offerings_count: 0,
            offerings_amount: 0,
            created_at: 1,
            updated_block: 1,
        })
        .await
        .unwrap();

        assert!(credit_grave(&mut tx, "42", 10, 5).await.unwrap());
        assert!(credit_grave(&mut tx, "42", 0, 6).await.unwrap());

        let grave = tx.find::<Grave>("42").await.unwrap().unwrap();
        assert_eq!(grave.offerings_count, 2);
        assert_eq!(grave.offerings_amount, 10);
        assert_eq!(grave.updated_block, 6);
    }

    #[test]
    fn test_step_pin_keeps_state_on_invalid_move() {
        let mut pin = overview(PinState::Requested);
        assert!(!step_pin(&mut pin, PinState::Grace));
        assert_eq!(pin.last_state, PinState::Requested);

        assert!(step_pin(&mut pin, PinState::Active));
        assert!(step_pin(&mut pin, PinState::Grace));
        assert!(step_pin(&mut pin, PinState::Expired));
        assert!(!step_pin(&mut pin, PinState::Active));
        assert_eq!(pin.last_state, PinState::Expired);
    }

    #[test]
    fn test_add_charge_saturates() {
        let mut pin = overview(PinState::Active);
        add_charge(&mut pin, u128::MAX - 1);
        add_charge(&mut pin, 5);
        assert_eq!(pin.total_charged, u128::MAX);
    }
}
