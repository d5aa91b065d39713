//! # Memopark Core
//!
//! Domain types, composite keys and id rules shared by the memopark indexer.
//!
//! ## Features
//!
//! - **Domain enums**: listing side, order state, case state, decision, pin state, grave kind
//! - **Governance keys**: `(scope, key)` object ids with an exact 8/56-bit packed form
//! - **Ids**: deterministic action, notification and case ids; day buckets
//! - **Constants**: module names and protocol defaults

#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod gov;
pub mod ids;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use error::{CoreError, Result};
pub use gov::{GovObjectId, GovScope};
pub use types::*;

pub use alloy_primitives::B256;
