//! Database types for the indexer storage layer.
//!
//! Projection rows carry the current state of one entity. Log rows are
//! immutable once written.

use alloy_primitives::B256;
use memopark_core::{
    CaseState, Decision, GovObjectId, GraveKind, ListingSide, OrderState, PinState,
};

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// An OTC listing as currently known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Listing id (chain id, decimal).
    pub id: String,
    /// Account that created the listing.
    pub maker: String,
    /// Buy or sell.
    pub side: ListingSide,
    /// Base asset id.
    pub base: u64,
    /// Quote asset id.
    pub quote: u64,
    /// Unit price.
    pub price: u128,
    /// Smallest fill accepted.
    pub min_qty: u128,
    /// Largest fill accepted.
    pub max_qty: u128,
    /// Quantity offered at creation.
    pub total: u128,
    /// Quantity still open.
    pub remaining: u128,
    /// Whether partial fills are allowed.
    pub partial: bool,
    /// Expiry block.
    pub expire_at: u64,
    /// Whether the listing can still be matched.
    pub active: bool,
    /// Block of the creating event.
    pub created_block: u64,
    /// Block of the last mutation.
    pub updated_block: u64,
}

/// An OTC order; `state` follows the latest applied order action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Order id.
    pub id: String,
    /// Listing the order was opened against.
    pub listing_id: String,
    /// Listing maker.
    pub maker: String,
    /// Order taker.
    pub taker: String,
    /// Agreed unit price.
    pub price: u128,
    /// Quantity.
    pub qty: u128,
    /// Total amount.
    pub amount: u128,
    /// Latest known state.
    pub state: OrderState,
    /// Creation moment as reported by the chain.
    pub created_at: u64,
    /// Expiry as reported by the chain.
    pub expire_at: u64,
    /// Block of the opening event.
    pub created_block: u64,
    /// Block of the last mutation.
    pub updated_block: u64,
}

/// An arbitration case keyed by `(domain, object_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbitrationCase {
    /// `{domain}-{object_id}`.
    pub id: String,
    /// Hex-encoded domain tag.
    pub domain: String,
    /// Id of the disputed object inside its domain.
    pub object_id: u64,
    /// Disputed or closed.
    pub state: CaseState,
    /// Block of the first referencing event.
    pub opened_at: u64,
    /// Block of the decision.
    pub closed_at: Option<u64>,
    /// Decision, once closed.
    pub decision: Option<Decision>,
    /// Split in basis points for partial decisions.
    pub bps: Option<u32>,
    /// Block of the last mutation.
    pub updated_block: u64,
}

/// Per-day arbitration counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArbDailyStat {
    /// Day key as a string.
    pub id: String,
    /// `floor(height / blocks_per_day)`.
    pub day: u64,
    /// Disputes opened.
    pub disputes: u64,
    /// Decisions recorded.
    pub arbitrated: u64,
    /// Release decisions.
    pub release: u64,
    /// Refund decisions.
    pub refund: u64,
    /// Partial decisions.
    pub partial: u64,
    /// Block of the last counted event.
    pub updated_block: u64,
}

/// A governance case, lazily opened by the first event that references it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovCase {
    /// `{pallet}-{packed object id}`.
    pub id: String,
    /// Module whose object is governed.
    pub pallet: String,
    /// Composite object key.
    pub object: GovObjectId,
    /// Block of the first referencing event.
    pub opened_at: u64,
    /// Block of the latest referencing event.
    pub last_action_at: u64,
    /// Latest evidence content id, if any.
    pub evidence_cid: Option<String>,
}

/// A grave (memorial hall).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grave {
    /// Grave id.
    pub id: String,
    /// Current owner.
    pub owner: String,
    /// Park the grave belongs to.
    pub park_id: Option<u64>,
    /// Person or event.
    pub kind: GraveKind,
    /// Primary deceased linked to the grave.
    pub primary_deceased_id: Option<u64>,
    /// Whether the grave is active.
    pub active: bool,
    /// Number of offerings made to the grave.
    pub offerings_count: u64,
    /// Sum of offering amounts.
    pub offerings_amount: u128,
    /// Creation block.
    pub created_at: u64,
    /// Block of the last mutation.
    pub updated_block: u64,
}

/// Billing overview of one pinned content id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinOverview {
    /// Content id hash (0x-prefixed hex).
    pub id: String,
    /// Block of the first referencing event.
    pub first_seen: u64,
    /// Paying account, once known.
    pub owner: Option<String>,
    /// Replica count.
    pub replicas: u32,
    /// Content size.
    pub size_bytes: u64,
    /// Sum of all charges; never decreases.
    pub total_charged: u128,
    /// Next charge block from the latest charge or grace event.
    pub last_next_charge_at: Option<u64>,
    /// Billing state.
    pub last_state: PinState,
    /// Block of the last mutation.
    pub updated_block: u64,
}

/// A referral code and its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralCode {
    /// The code itself.
    pub id: String,
    /// Owning account.
    pub owner: String,
    /// Block the code was first claimed.
    pub claimed_at: u64,
    /// Block of the last mutation.
    pub updated_block: u64,
}

// ---------------------------------------------------------------------------
// Append-only logs
// ---------------------------------------------------------------------------

/// Which per-entity action log a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionLog {
    /// `listing_actions`
    Listing,
    /// `order_actions`
    Order,
    /// `arbitration_actions`
    Arbitration,
    /// `gov_actions`
    Gov,
    /// `grave_actions`
    Grave,
}

impl ActionLog {
    /// Backing table.
    pub fn table(&self) -> &'static str {
        match self {
            ActionLog::Listing => "listing_actions",
            ActionLog::Order => "order_actions",
            ActionLog::Arbitration => "arbitration_actions",
            ActionLog::Gov => "gov_actions",
            ActionLog::Grave => "grave_actions",
        }
    }
}

/// One state-changing event in an entity's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    /// Log the record belongs to.
    pub log: ActionLog,
    /// `{entity}-{kind}-{block}`.
    pub id: String,
    /// Id of the entity the action applies to.
    pub entity_ref: String,
    /// Action kind, e.g. `Created`.
    pub kind: String,
    /// Block height.
    pub block: u64,
    /// Position of the originating event inside its block.
    pub index_in_block: u32,
    /// Hash of the originating extrinsic.
    pub extrinsic_hash: Option<B256>,
    /// Free-form JSON metadata.
    pub meta: Option<String>,
}

/// One charge, grace or expiry step of a pinned content id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinBillingEvent {
    /// `{cid}-{kind}-{block}`.
    pub id: String,
    /// Content id hash.
    pub cid: String,
    /// Billing step kind.
    pub kind: String,
    /// Amount charged or quoted.
    pub amount: Option<u128>,
    /// Next charge block, when reported.
    pub next_charge_at: Option<u64>,
    /// Block height.
    pub block: u64,
    /// Position of the originating event inside its block.
    pub index_in_block: u32,
    /// Hash of the originating extrinsic.
    pub extrinsic_hash: Option<B256>,
}

/// An offering made to a target object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offering {
    /// Offering id.
    pub id: String,
    /// Target domain (0 = grave).
    pub target_domain: u64,
    /// Target id inside the domain.
    pub target_id: u64,
    /// Account that made the offering.
    pub who: String,
    /// Offering kind, when reported.
    pub kind_code: Option<u64>,
    /// Amount paid (zero when not reported).
    pub amount: u128,
    /// Block height.
    pub block: u64,
}

/// Settlement of an offering to its beneficiary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferingSettlement {
    /// `{offering}-Settled-{block}`.
    pub id: String,
    /// Settled offering.
    pub offering_id: String,
    /// Receiving account.
    pub recipient: Option<String>,
    /// Amount paid out.
    pub amount: u128,
    /// Block height.
    pub block: u64,
    /// Hash of the originating extrinsic.
    pub extrinsic_hash: Option<B256>,
}

/// A point on the price timeline of one offering kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferingPriceSnapshot {
    /// `{kind_code}-{block}`.
    pub id: String,
    /// Offering kind.
    pub kind_code: u64,
    /// One-off price, if the kind has one.
    pub fixed_price: Option<u128>,
    /// Weekly price, if the kind is time-based.
    pub unit_price_per_week: Option<u128>,
    /// Block height.
    pub block: u64,
}

/// Sponsor relation of one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralLink {
    /// `{who}-{sponsor}`.
    pub id: String,
    /// Referred account.
    pub who: String,
    /// Sponsoring account.
    pub sponsor: String,
    /// Block height.
    pub block: u64,
}

/// A guestbook message posted on a grave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestbookMessage {
    /// Message id.
    pub id: String,
    /// Grave the message was posted on.
    pub grave_id: u64,
    /// Author.
    pub who: String,
    /// Block height.
    pub block: u64,
}

/// A media item added to an album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Media id.
    pub id: String,
    /// Album the media belongs to.
    pub album_id: u64,
    /// Block height.
    pub block: u64,
}

/// One row of the cross-entity notification feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// `N-{block}-{index_in_block}`.
    pub id: String,
    /// Emitting module.
    pub module: String,
    /// Event name.
    pub kind: String,
    /// Id of the referenced entity.
    pub ref_id: String,
    /// Acting account, if meaningful.
    pub actor: Option<String>,
    /// Block height.
    pub block: u64,
    /// Hash of the originating extrinsic.
    pub extrinsic_hash: Option<B256>,
    /// Free-form JSON metadata.
    pub meta: Option<String>,
}

// ---------------------------------------------------------------------------
// Sync bookkeeping
// ---------------------------------------------------------------------------

/// Sync state record (singleton).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Last fully applied block, `None` before the first block.
    pub last_block_number: Option<u64>,

    /// Hash of the last applied block, when the source reports hashes.
    pub last_block_hash: Option<B256>,

    /// Unix timestamp of last update.
    pub updated_at: i64,
}

impl SyncState {
    /// Height the next block must exceed.
    pub fn next_height(&self, start_block: u64) -> u64 {
        match self.last_block_number {
            Some(last) => start_block.max(last + 1),
            None => start_block,
        }
    }
}

/// A block record for divergence detection and auditing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    /// Block number
    pub block_number: u64,

    /// Block hash
    pub block_hash: Option<B256>,

    /// Parent block hash
    pub parent_hash: Option<B256>,

    /// Events delivered in the block
    pub event_count: u64,

    /// Events that matched a handler and were applied
    pub applied: u64,

    /// Events skipped as malformed
    pub skipped: u64,

    /// When this block was indexed
    pub indexed_at: i64,
}
