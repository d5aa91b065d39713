//! Domain enums stored in projection rows.
//!
//! Every enum round-trips through `as_str` / `FromStr` so the store keeps
//! stable human-readable values, and through a chain code where the ledger
//! emits one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

macro_rules! string_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Convert to database string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    _ => Err(CoreError::UnknownValue {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Which side of the book a listing sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingSide {
    /// Maker wants to buy the base asset.
    Buy,
    /// Maker wants to sell the base asset.
    Sell,
}

string_enum!(ListingSide, "listing side", { Buy => "Buy", Sell => "Sell" });

impl ListingSide {
    /// Map the on-chain side code (0 = Buy, 1 = Sell).
    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(ListingSide::Buy),
            1 => Ok(ListingSide::Sell),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }

    /// Parse either a variant name or a numeric code.
    pub fn parse_loose(s: &str) -> Result<Self> {
        match s.trim() {
            "Buy" | "buy" | "BUY" => Ok(ListingSide::Buy),
            "Sell" | "sell" | "SELL" => Ok(ListingSide::Sell),
            other => other
                .parse::<u64>()
                .map_err(|_| CoreError::InvalidSide(other.to_string()))
                .and_then(Self::from_code),
        }
    }
}

/// Lifecycle of an OTC order, as last reported by its action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    /// Order opened against a listing.
    Created,
    /// Taker committed payment.
    PaidCommitted,
    /// Escrow released to the taker.
    Released,
    /// Escrow refunded to the maker.
    Refunded,
    /// Order canceled before settlement.
    Canceled,
    /// Order escalated to arbitration.
    Disputed,
}

string_enum!(OrderState, "order state", {
    Created => "Created",
    PaidCommitted => "PaidCommitted",
    Released => "Released",
    Refunded => "Refunded",
    Canceled => "Canceled",
    Disputed => "Disputed",
});

/// State of an arbitration case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseState {
    /// Dispute opened, awaiting a decision.
    Disputed,
    /// Decision recorded; terminal.
    Closed,
}

string_enum!(CaseState, "case state", { Disputed => "Disputed", Closed => "Closed" });

/// Outcome of an arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Funds go to the counterparty that was owed them.
    Release,
    /// Funds go back to the payer.
    Refund,
    /// Funds split by basis points.
    Partial,
}

string_enum!(Decision, "decision", {
    Release => "Release",
    Refund => "Refund",
    Partial => "Partial",
});

impl Decision {
    /// Map the on-chain decision code. 0 is a release, 1 a refund and any
    /// other code a partial split.
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => Decision::Release,
            1 => Decision::Refund,
            _ => Decision::Partial,
        }
    }

    /// Parse either a variant name (any case) or a numeric code.
    pub fn parse_loose(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(Decision::Release),
            "refund" => Ok(Decision::Refund),
            "partial" => Ok(Decision::Partial),
            _ => s
                .parse::<u64>()
                .map(Self::from_code)
                .map_err(|_| CoreError::InvalidDecision(s.to_string())),
        }
    }
}

/// Billing lifecycle of a pinned content id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinState {
    /// Pin requested and paid for, not yet confirmed.
    Requested,
    /// Pinned and paid up.
    Active,
    /// A charge failed; the content is in its grace period.
    Grace,
    /// Grace ran out; terminal.
    Expired,
}

string_enum!(PinState, "pin state", {
    Requested => "Requested",
    Active => "Active",
    Grace => "Grace",
    Expired => "Expired",
});

impl PinState {
    /// Whether the billing state machine allows moving from `self` to `next`.
    ///
    /// Requested→Active, Active→Active (renewal), Active→Grace, Grace→Active,
    /// Grace→Expired.
    pub fn can_transition(self, next: PinState) -> bool {
        matches!(
            (self, next),
            (PinState::Requested, PinState::Active)
                | (PinState::Active, PinState::Active)
                | (PinState::Active, PinState::Grace)
                | (PinState::Grace, PinState::Active)
                | (PinState::Grace, PinState::Expired)
        )
    }
}

/// What a grave commemorates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraveKind {
    /// A single person.
    Person,
    /// An event.
    Event,
}

string_enum!(GraveKind, "grave kind", { Person => "Person", Event => "Event" });

impl GraveKind {
    /// Map the on-chain kind code; zero is a person, anything else an event.
    pub fn from_code(code: u64) -> Self {
        if code == 0 {
            GraveKind::Person
        } else {
            GraveKind::Event
        }
    }
}
