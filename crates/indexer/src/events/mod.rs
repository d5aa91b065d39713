//! Event decoding.
//!
//! Every known `(module, event)` signature maps to exactly one
//! [`MappedEvent`] variant; anything else decodes to `None` and is ignored.

use memopark_core::{modules, Decision, GovObjectId, GovScope, OrderState};

use crate::error::DecodeError;
use crate::source::ChainEvent;

pub mod args;

pub use args::Args;

/// Canonical `(snake_case module, event name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventTag {
    /// Module, e.g. `otc_listing`.
    pub module: String,
    /// Event name, e.g. `ListingCreated`.
    pub name: String,
}

impl EventTag {
    /// Canonicalize the tag of a raw event.
    ///
    /// A dotted name (`OtcListing.ListingCreated`) carries its own module
    /// and overrides an empty `module` field.
    pub fn of(event: &ChainEvent) -> Self {
        let (module, name) = match event.name.rsplit_once('.') {
            Some((prefix, name)) if event.module.is_empty() => (prefix, name),
            Some((_, name)) => (event.module.as_str(), name),
            None => (event.module.as_str(), event.name.as_str()),
        };

        Self {
            module: args::snake_case(module),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for EventTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// How a listing left the book without being filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingClose {
    /// Maker canceled.
    Canceled,
    /// Expiry passed.
    Expired,
}

impl ListingClose {
    /// Action kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingClose::Canceled => "Canceled",
            ListingClose::Expired => "Expired",
        }
    }
}

/// Off-chain detail an order party revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reveal {
    /// Payment details.
    Payment,
    /// Contact details.
    Contact,
}

impl Reveal {
    /// Action kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Reveal::Payment => "PaymentRevealed",
            Reveal::Contact => "ContactRevealed",
        }
    }
}

/// Stage of a content appeal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppealStage {
    /// Appeal filed.
    Submitted,
    /// Approved by governance.
    Approved,
    /// Rejected by governance.
    Rejected,
    /// Withdrawn by the appellant.
    Withdrawn,
    /// Approved appeal carried out.
    Executed,
}

impl AppealStage {
    /// Action kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStage::Submitted => "Submitted",
            AppealStage::Approved => "Approved",
            AppealStage::Rejected => "Rejected",
            AppealStage::Withdrawn => "Withdrawn",
            AppealStage::Executed => "Executed",
        }
    }
}

/// A decoded event the mapper knows how to apply.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedEvent {
    /// A maker put a listing on the book.
    ListingCreated {
        id: String,
        maker: String,
        side: memopark_core::ListingSide,
        base: u64,
        quote: u64,
        price: u128,
        min_qty: u128,
        max_qty: u128,
        total: u128,
        remaining: u128,
        partial: bool,
        expire_at: u64,
    },
    /// Part of a listing was taken.
    ListingMatched {
        id: String,
        qty: u128,
    },
    /// A listing was canceled or expired.
    ListingClosed {
        id: String,
        how: ListingClose,
    },
    /// A taker opened an order against a listing.
    OrderOpened {
        id: String,
        listing_id: String,
        maker: String,
        taker: String,
        price: u128,
        qty: u128,
        amount: u128,
        created_at: u64,
        expire_at: u64,
    },
    /// An order moved to a new state.
    OrderStateChanged {
        id: String,
        state: OrderState,
    },
    /// An order party revealed payment or contact details.
    OrderRevealed {
        id: String,
        what: Reveal,
    },
    /// An object was brought to arbitration.
    Disputed {
        domain: String,
        object_id: u64,
    },
    /// An arbitration decision was recorded.
    Arbitrated {
        domain: String,
        object_id: u64,
        decision: Decision,
        bps: Option<u32>,
    },
    /// A grave (hall) was created.
    GraveCreated {
        id: String,
        owner: String,
        park_id: Option<u64>,
        kind: u64,
    },
    /// A deceased was linked to (interred in) a grave.
    GraveLinkedDeceased {
        id: String,
        deceased_id: u64,
    },
    /// A grave was moved to a park.
    GraveSetPark {
        id: String,
        park_id: u64,
    },
    /// A grave changed owner.
    GraveTransferred {
        id: String,
        new_owner: String,
    },
    /// An offering was made to a target object.
    OfferingCommitted {
        id: String,
        target_domain: u64,
        target_id: u64,
        who: String,
        amount: u128,
        kind_code: Option<u64>,
    },
    /// An offering was paid out.
    OfferingSettled {
        id: String,
        to: Option<String>,
        amount: u128,
    },
    /// The price rule of an offering kind changed.
    OfferingPriceUpdated {
        kind_code: u64,
        fixed_price: Option<u128>,
        unit_price_per_week: Option<u128>,
    },
    /// Module-wide offering parameters changed.
    OfferParamsUpdated,
    /// The global offering pause switch was set.
    PausedGlobalSet {
        paused: bool,
    },
    /// The pause switch of one target domain was set.
    PausedByDomainSet {
        domain: u64,
        paused: bool,
    },
    /// A content appeal moved through its lifecycle.
    Appeal {
        id: u64,
        stage: AppealStage,
        who: Option<String>,
    },
    /// Evidence was attached to a governed object.
    GovEvidenceNoted {
        object: GovObjectId,
        cid: String,
    },
    /// Pinning of a content id was requested and paid.
    PinRequested {
        cid: String,
        payer: String,
        replicas: u32,
        size_bytes: u64,
        price: u128,
    },
    /// Operators confirmed the content is pinned.
    PinMarkedPinned {
        cid: String,
        replicas: Option<u32>,
    },
    /// A periodic pin charge succeeded.
    PinCharged {
        cid: String,
        amount: u128,
        next_charge_at: Option<u64>,
    },
    /// A pin charge failed; grace period started.
    PinGrace {
        cid: String,
        next_charge_at: Option<u64>,
    },
    /// Grace ran out; the pin is dropped.
    PinExpired {
        cid: String,
    },
    /// An account bound its referral sponsor.
    SponsorBound {
        who: String,
        sponsor: String,
    },
    /// An account claimed a referral code.
    CodeClaimed {
        who: String,
        code: String,
    },
    /// A guestbook message was posted on a grave.
    MessagePosted {
        grave_id: u64,
        message_id: String,
        who: String,
    },
    /// A media item was added to an album.
    MediaAdded {
        media_id: String,
        album_id: u64,
    },
}

type Result<T> = std::result::Result<T, DecodeError>;

impl MappedEvent {
    /// Decode a raw event.
    ///
    /// `Ok(None)` means the signature is not one the indexer follows.
    pub fn decode(event: &ChainEvent) -> Result<Option<Self>> {
        let tag = EventTag::of(event);
        let a = Args::new(&event.args);

        let mapped = match (tag.module.as_str(), tag.name.as_str()) {
            (modules::OTC_LISTING, "ListingCreated") => MappedEvent::ListingCreated {
                id: a.string("id", 0)?,
                maker: a.string("maker", 1)?,
                side: listing_side(&a)?,
                base: a.u64_or_zero("base", 3)?,
                quote: a.u64_or_zero("quote", 4)?,
                price: a.u128_or_zero("price", 5)?,
                min_qty: a.u128_or_zero("min_qty", 6)?,
                max_qty: a.u128_or_zero("max_qty", 7)?,
                total: a.u128_or_zero("total", 8)?,
                remaining: a.u128_or_zero("remaining", 9)?,
                partial: a.flag("partial", 10)?,
                expire_at: a.u64_or_zero("expire_at", 11)?,
            },
            (modules::OTC_LISTING, "ListingMatched") => MappedEvent::ListingMatched {
                id: a.string("id", 0)?,
                qty: a.u128_or_zero("qty", 1)?,
            },
            (modules::OTC_LISTING, "ListingCanceled") => MappedEvent::ListingClosed {
                id: a.string("id", 0)?,
                how: ListingClose::Canceled,
            },
            (modules::OTC_LISTING, "ListingExpired") => MappedEvent::ListingClosed {
                id: a.string("id", 0)?,
                how: ListingClose::Expired,
            },

            (modules::OTC_ORDER, "OrderOpened") => MappedEvent::OrderOpened {
                id: a.string("id", 0)?,
                listing_id: a.string("listing_id", 1)?,
                maker: a.string("maker", 2)?,
                taker: a.string("taker", 3)?,
                price: a.u128_or_zero("price", 4)?,
                qty: a.u128_or_zero("qty", 5)?,
                amount: a.u128_or_zero("amount", 6)?,
                created_at: a.u64_or_zero("created_at", 7)?,
                expire_at: a.u64_or_zero("expire_at", 8)?,
            },
            (modules::OTC_ORDER, "OrderPaidCommitted") => order_state(&a, OrderState::PaidCommitted)?,
            (modules::OTC_ORDER, "OrderReleased") => order_state(&a, OrderState::Released)?,
            (modules::OTC_ORDER, "OrderRefunded") => order_state(&a, OrderState::Refunded)?,
            (modules::OTC_ORDER, "OrderCanceled") => order_state(&a, OrderState::Canceled)?,
            (modules::OTC_ORDER, "OrderDisputed") => order_state(&a, OrderState::Disputed)?,
            (modules::OTC_ORDER, "PaymentRevealed") => MappedEvent::OrderRevealed {
                id: a.string("id", 0)?,
                what: Reveal::Payment,
            },
            (modules::OTC_ORDER, "ContactRevealed") => MappedEvent::OrderRevealed {
                id: a.string("id", 0)?,
                what: Reveal::Contact,
            },

            (modules::ARBITRATION, "Disputed") => MappedEvent::Disputed {
                domain: a.bytes_hex("domain", 0)?,
                object_id: a.u64("id", 1)?,
            },
            (modules::ARBITRATION, "Arbitrated") => {
                let (decision, carried_bps) = decision(&a)?;
                let bps = a
                    .opt_u64("bps", 3)?
                    .or(carried_bps)
                    .map(|v| {
                        u32::try_from(v).map_err(|_| DecodeError::malformed("bps", "out of range"))
                    })
                    .transpose()?;
                MappedEvent::Arbitrated {
                    domain: a.bytes_hex("domain", 0)?,
                    object_id: a.u64("id", 1)?,
                    decision,
                    bps,
                }
            }

            (modules::MEMO_GRAVE, "GraveCreated" | "HallCreated") => MappedEvent::GraveCreated {
                id: a.string("id", 0)?,
                owner: a.string("owner", 1)?,
                park_id: a.opt_u64("park_id", 2)?,
                kind: a.u64_or_zero("kind", 3)?,
            },
            (modules::MEMO_GRAVE, "GraveLinkedDeceased" | "HallLinkedDeceased" | "Interred") => {
                MappedEvent::GraveLinkedDeceased {
                    id: a.string("id", 0)?,
                    deceased_id: a.u64("deceased_id", 1)?,
                }
            }
            (modules::MEMO_GRAVE, "GraveSetPark" | "HallSetPark") => MappedEvent::GraveSetPark {
                id: a.string("id", 0)?,
                park_id: a.u64("park_id", 1)?,
            },
            (modules::MEMO_GRAVE, "GraveTransferred") => MappedEvent::GraveTransferred {
                id: a.string("id", 0)?,
                new_owner: a.string("new_owner", 1)?,
            },

            (modules::MEMO_OFFERINGS, "OfferingCommitted") => {
                let (target_domain, target_id) = a.pair_u64("target", 1, "domain", "id")?;
                MappedEvent::OfferingCommitted {
                    id: a.string("id", 0)?,
                    target_domain,
                    target_id,
                    who: a.string("who", 2)?,
                    amount: a.u128_or_zero("amount", 3)?,
                    kind_code: a.opt_u64("kind_code", 4)?,
                }
            }
            (modules::MEMO_OFFERINGS, "OfferingSettled") => MappedEvent::OfferingSettled {
                id: a.string("id", 0)?,
                to: a.opt_string("to", 1)?,
                amount: a.u128_or_zero("amount", 2)?,
            },
            (modules::MEMO_OFFERINGS, "OfferingPriceUpdated") => {
                MappedEvent::OfferingPriceUpdated {
                    kind_code: a.u64("kind_code", 0)?,
                    fixed_price: a.opt_u128("fixed_price", 1)?,
                    unit_price_per_week: a.opt_u128("unit_price_per_week", 2)?,
                }
            }
            (modules::MEMO_OFFERINGS, "OfferParamsUpdated") => MappedEvent::OfferParamsUpdated,
            (modules::MEMO_OFFERINGS, "PausedGlobalSet") => MappedEvent::PausedGlobalSet {
                paused: a.flag("paused", 0)?,
            },
            (modules::MEMO_OFFERINGS, "PausedByDomainSet") => MappedEvent::PausedByDomainSet {
                domain: a.u64("domain", 0)?,
                paused: a.flag("paused", 1)?,
            },

            (modules::MEMO_CONTENT_GOVERNANCE, "AppealSubmitted") => appeal(&a, AppealStage::Submitted)?,
            (modules::MEMO_CONTENT_GOVERNANCE, "AppealApproved") => appeal(&a, AppealStage::Approved)?,
            (modules::MEMO_CONTENT_GOVERNANCE, "AppealRejected") => appeal(&a, AppealStage::Rejected)?,
            (modules::MEMO_CONTENT_GOVERNANCE, "AppealWithdrawn") => appeal(&a, AppealStage::Withdrawn)?,
            (modules::MEMO_CONTENT_GOVERNANCE, "AppealExecuted") => appeal(&a, AppealStage::Executed)?,
            (modules::MEMO_CONTENT_GOVERNANCE, "GovEvidenceNoted") => {
                let code = a.u64("scope", 0)?;
                let scope = u8::try_from(code)
                    .ok()
                    .and_then(|c| GovScope::from_code(c).ok())
                    .ok_or_else(|| DecodeError::malformed("scope", format!("unknown scope {}", code)))?;
                let object = GovObjectId::new(scope, a.u64("key", 1)?)
                    .map_err(|e| DecodeError::malformed("key", e.to_string()))?;
                MappedEvent::GovEvidenceNoted {
                    object,
                    cid: a.string("cid", 2)?,
                }
            }

            (modules::MEMO_IPFS, "PinRequested") => MappedEvent::PinRequested {
                cid: cid_hash(&a)?,
                payer: a.string("payer", 1)?,
                replicas: replicas(a.u64_or_zero("replicas", 2)?)?,
                size_bytes: a.u64_or_zero("size_bytes", 3)?,
                price: a.u128_or_zero("price", 4)?,
            },
            (modules::MEMO_IPFS, "PinMarkedPinned") => MappedEvent::PinMarkedPinned {
                cid: cid_hash(&a)?,
                replicas: a.opt_u64("replicas", 1)?.map(replicas).transpose()?,
            },
            (modules::MEMO_IPFS, "PinCharged") => MappedEvent::PinCharged {
                cid: cid_hash(&a)?,
                amount: a.u128_or_zero("amount", 1)?,
                next_charge_at: a.opt_u64("next_charge_at", 2)?,
            },
            (modules::MEMO_IPFS, "PinGrace") => MappedEvent::PinGrace {
                cid: cid_hash(&a)?,
                next_charge_at: a.opt_u64("next_charge_at", 1)?,
            },
            (modules::MEMO_IPFS, "PinExpired") => MappedEvent::PinExpired { cid: cid_hash(&a)? },

            (modules::MEMO_REFERRALS, "SponsorBound") => MappedEvent::SponsorBound {
                who: a.string("who", 0)?,
                sponsor: a.string("sponsor", 1)?,
            },
            (modules::MEMO_REFERRALS, "CodeClaimed") => MappedEvent::CodeClaimed {
                who: a.string("who", 0)?,
                code: a.string("code", 1)?,
            },

            (modules::GRAVE_GUESTBOOK, "MessagePosted") => MappedEvent::MessagePosted {
                grave_id: a.u64("grave_id", 0)?,
                message_id: a.string("message_id", 1)?,
                who: a.string("who", 2)?,
            },
            (modules::DECEASED_MEDIA, "MediaAdded") => MappedEvent::MediaAdded {
                media_id: a.string("media_id", 0)?,
                album_id: a.u64_or_zero("album_id", 1)?,
            },

            _ => return Ok(None),
        };

        Ok(Some(mapped))
    }
}

/// Unwrap a `{"__kind": ...}` enum object to its variant.
fn enum_variant(value: &serde_json::Value) -> &serde_json::Value {
    value.get("__kind").unwrap_or(value)
}

fn listing_side(a: &Args<'_>) -> Result<memopark_core::ListingSide> {
    match a.raw("side", 2).map(enum_variant) {
        None => Err(DecodeError::Missing("side")),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|code| memopark_core::ListingSide::from_code(code).ok())
            .ok_or_else(|| DecodeError::malformed("side", n.to_string())),
        Some(serde_json::Value::String(s)) => memopark_core::ListingSide::parse_loose(s)
            .map_err(|e| DecodeError::malformed("side", e.to_string())),
        Some(other) => Err(DecodeError::malformed("side", other.to_string())),
    }
}

/// Decision by code, name or enum object, plus the split an enum object
/// may carry as its `value`.
fn decision(a: &Args<'_>) -> Result<(Decision, Option<u64>)> {
    let raw = a.raw("decision", 2).ok_or(DecodeError::Missing("decision"))?;
    let carried = raw.get("value").and_then(serde_json::Value::as_u64);
    let decision = match enum_variant(raw) {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(Decision::from_code)
            .ok_or_else(|| DecodeError::malformed("decision", n.to_string()))?,
        serde_json::Value::String(s) => Decision::parse_loose(s)
            .map_err(|e| DecodeError::malformed("decision", e.to_string()))?,
        other => return Err(DecodeError::malformed("decision", other.to_string())),
    };
    Ok((decision, carried))
}

fn order_state(a: &Args<'_>, state: OrderState) -> Result<MappedEvent> {
    Ok(MappedEvent::OrderStateChanged {
        id: a.string("id", 0)?,
        state,
    })
}

fn appeal(a: &Args<'_>, stage: AppealStage) -> Result<MappedEvent> {
    Ok(MappedEvent::Appeal {
        id: a.u64("id", 0)?,
        stage,
        who: a.opt_string("who", 1)?,
    })
}

fn cid_hash(a: &Args<'_>) -> Result<String> {
    Ok(format!("0x{}", a.bytes_hex("cid_hash", 0)?))
}

fn replicas(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| DecodeError::malformed("replicas", "out of range"))
}
