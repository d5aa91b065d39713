//! Protocol constants shared by the mapper and the store.

/// Blocks per day at a 6 second block time.
pub const DEFAULT_BLOCKS_PER_DAY: u64 = 14_400;

/// Offering target domain that refers to a grave.
pub const OFFERING_DOMAIN_GRAVE: u8 = 0;

/// Number of low bits reserved for the key part of a packed governance object id.
pub const GOV_KEY_BITS: u32 = 56;

/// Largest key representable under any governance scope.
pub const GOV_MAX_KEY: u64 = (1u64 << GOV_KEY_BITS) - 1;

/// Module names as they appear in canonical event tags.
pub mod modules {
    /// OTC listings (maker side of the order book).
    pub const OTC_LISTING: &str = "otc_listing";
    /// OTC orders (taker side).
    pub const OTC_ORDER: &str = "otc_order";
    /// Dispute resolution.
    pub const ARBITRATION: &str = "arbitration";
    /// Graves / memorial halls.
    pub const MEMO_GRAVE: &str = "memo_grave";
    /// Offerings and their governed price table.
    pub const MEMO_OFFERINGS: &str = "memo_offerings";
    /// Appeals and evidence notes.
    pub const MEMO_CONTENT_GOVERNANCE: &str = "memo_content_governance";
    /// Content pinning and its billing.
    pub const MEMO_IPFS: &str = "memo_ipfs";
    /// Referral graph.
    pub const MEMO_REFERRALS: &str = "memo_referrals";
    /// Guestbook messages on graves.
    pub const GRAVE_GUESTBOOK: &str = "grave_guestbook";
    /// Media attached to deceased profiles.
    pub const DECEASED_MEDIA: &str = "deceased_media";
}
