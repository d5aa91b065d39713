//! Typed errors the indexer distinguishes from plain I/O failures.
//!
//! These travel inside `anyhow::Error` and are recovered with
//! `downcast_ref` where the caller needs to react to them.

use alloy_primitives::B256;
use thiserror::Error;

/// A single event payload could not be decoded.
///
/// Recoverable: the mapper skips the event and continues with the block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A required argument is absent.
    #[error("missing argument `{0}`")]
    Missing(&'static str),

    /// An argument is present but has the wrong shape.
    #[error("argument `{field}` is malformed: {reason}")]
    Malformed {
        /// Argument name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            field,
            reason: reason.into(),
        }
    }
}

/// An append-only row already exists with different content.
///
/// Fatal: the block transaction is rolled back and indexing halts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("append-only row {table}/{id} already exists with different content")]
pub struct AppendConflict {
    /// Table of the colliding row.
    pub table: &'static str,
    /// Id of the colliding row.
    pub id: String,
}

/// A delivered block does not extend the stored chain.
///
/// Fatal: recovery is `reset` followed by a re-index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("reorg detected at block {height}: parent {parent_hash} does not match stored {stored_hash}")]
pub struct ReorgDetected {
    /// Height of the rejected block.
    pub height: u64,
    /// Parent hash carried by the rejected block.
    pub parent_hash: B256,
    /// Hash stored for `height - 1`.
    pub stored_hash: B256,
}
