//! Governance object keys.
//!
//! One governance case table spans several disjoint sub-domains: appeals
//! keyed by their own id, global parameter changes, per-kind price rules,
//! the global pause switch, per-domain pause switches and free-standing
//! evidence notes. [`GovObjectId`] keeps the `(scope, key)` pair as a native
//! composite key and packs it into one `u64` only at the storage edge:
//!
//! ```text
//!  63      56 55                                   0
//! ┌──────────┬──────────────────────────────────────┐
//! │  scope   │                 key                  │
//! └──────────┴──────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{GOV_KEY_BITS, GOV_MAX_KEY};
use crate::error::{CoreError, Result};

/// Sub-domain a governed object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum GovScope {
    /// The object's own id, unchanged (appeals).
    Passthrough = 0,
    /// Module-wide parameters; key is always 0.
    GlobalParams = 1,
    /// Price rule of one offering kind; key is the kind code.
    PriceKind = 2,
    /// Module-wide pause switch; key is always 0.
    GlobalPause = 3,
    /// Pause switch of one target domain; key is the domain code.
    DomainPause = 4,
    /// Evidence note attached to an arbitrary key.
    Evidence = 5,
}

impl GovScope {
    /// Numeric scope tag.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Parse a numeric scope tag.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(GovScope::Passthrough),
            1 => Ok(GovScope::GlobalParams),
            2 => Ok(GovScope::PriceKind),
            3 => Ok(GovScope::GlobalPause),
            4 => Ok(GovScope::DomainPause),
            5 => Ok(GovScope::Evidence),
            other => Err(CoreError::InvalidScope(other)),
        }
    }
}

/// Composite `(scope, key)` identifier of a governed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GovObjectId {
    scope: GovScope,
    key: u64,
}

impl GovObjectId {
    /// Build an id, rejecting keys wider than 56 bits.
    pub fn new(scope: GovScope, key: u64) -> Result<Self> {
        if key > GOV_MAX_KEY {
            return Err(CoreError::KeyOutOfRange(key));
        }
        Ok(Self { scope, key })
    }

    /// Id of a singleton scope (global params, global pause).
    pub fn singleton(scope: GovScope) -> Self {
        Self { scope, key: 0 }
    }

    /// The scope tag.
    pub fn scope(&self) -> GovScope {
        self.scope
    }

    /// The key within the scope.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Packed form: `(scope << 56) | key`.
    ///
    /// With at most six scopes the result stays below `2^59`, so it also
    /// fits a signed 64-bit column.
    pub fn packed(&self) -> u64 {
        (u64::from(self.scope.code()) << GOV_KEY_BITS) | self.key
    }

    /// Inverse of [`GovObjectId::packed`].
    pub fn unpack(packed: u64) -> Result<Self> {
        let code = (packed >> GOV_KEY_BITS) as u8;
        let scope = GovScope::from_code(code)?;
        Ok(Self {
            scope,
            key: packed & GOV_MAX_KEY,
        })
    }
}

impl fmt::Display for GovObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.packed())
    }
}
