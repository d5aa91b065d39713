//! Deterministic row identifiers.
//!
//! Ids are derived only from on-chain identifiers and the block height (plus
//! the in-block index where one block can emit several rows for the same
//! key), never from arrival order. Replaying a block therefore reproduces the
//! exact same ids.

use crate::error::{CoreError, Result};
use crate::gov::GovObjectId;

/// Action-log id: `{entity}-{kind}-{height}`.
pub fn action_id(entity_id: &str, kind: &str, height: u64) -> String {
    format!("{}-{}-{}", entity_id, kind, height)
}

/// Action-log id for kinds the chain may emit more than once per entity
/// in one block: `{entity}-{kind}-{height}-{index_in_block}`.
pub fn indexed_action_id(entity_id: &str, kind: &str, height: u64, index_in_block: u32) -> String {
    format!("{}-{}-{}-{}", entity_id, kind, height, index_in_block)
}

/// Notification id: `N-{height}-{index_in_block}`.
pub fn notification_id(height: u64, index_in_block: u32) -> String {
    format!("N-{}-{}", height, index_in_block)
}

/// Arbitration case id: `{domain}-{object_id}`.
pub fn case_id(domain: &str, object_id: u64) -> String {
    format!("{}-{}", domain, object_id)
}

/// Governance case id: `{pallet}-{packed object id}`.
pub fn gov_case_id(pallet: &str, object: &GovObjectId) -> String {
    format!("{}-{}", pallet, object.packed())
}

/// Referral link id: `{who}-{sponsor}`.
pub fn referral_link_id(who: &str, sponsor: &str) -> String {
    format!("{}-{}", who, sponsor)
}

/// Price snapshot id: `{kind_code}-{height}`.
pub fn price_snapshot_id(kind_code: u64, height: u64) -> String {
    format!("{}-{}", kind_code, height)
}

/// Daily bucket of a block: `floor(height / blocks_per_day)`.
pub fn day_key(height: u64, blocks_per_day: u64) -> Result<u64> {
    if blocks_per_day == 0 {
        return Err(CoreError::ZeroBlocksPerDay);
    }
    Ok(height / blocks_per_day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_BLOCKS_PER_DAY;
    use crate::gov::GovScope;

    #[test]
    fn test_action_id_format() {
        assert_eq!(action_id("7", "Canceled", 250), "7-Canceled-250");
        assert_eq!(notification_id(100, 3), "N-100-3");
        assert_eq!(indexed_action_id("7", "Matched", 120, 2), "7-Matched-120-2");
    }

    #[test]
    fn test_gov_case_id_uses_packed_key() {
        let object = GovObjectId::new(GovScope::DomainPause, 3).unwrap();
        assert_eq!(
            gov_case_id("memo_offerings", &object),
            format!("memo_offerings-{}", (4u64 << 56) + 3)
        );
    }

    #[test]
    fn test_day_key_buckets() {
        assert_eq!(day_key(0, DEFAULT_BLOCKS_PER_DAY).unwrap(), 0);
        assert_eq!(day_key(14_399, DEFAULT_BLOCKS_PER_DAY).unwrap(), 0);
        assert_eq!(day_key(14_400, DEFAULT_BLOCKS_PER_DAY).unwrap(), 1);
        assert_eq!(day_key(5, 0), Err(CoreError::ZeroBlocksPerDay));
    }
}
