//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Unknown listing side code or name.
    #[error("Invalid listing side: {0}")]
    InvalidSide(String),

    /// Unknown arbitration decision code or name.
    #[error("Invalid arbitration decision: {0}")]
    InvalidDecision(String),

    /// Unknown governance scope code.
    #[error("Invalid governance scope: {0} (must be between 0 and 5)")]
    InvalidScope(u8),

    /// Governance key does not fit in the 56 low bits of a packed object id.
    #[error("Governance key {0} exceeds the 56-bit key space")]
    KeyOutOfRange(u64),

    /// Stored enum value could not be recognised.
    #[error("Unknown {kind} value: {value}")]
    UnknownValue {
        /// Which enum was being parsed.
        kind: &'static str,
        /// The offending value.
        value: String,
    },

    /// Days must be at least one block long.
    #[error("blocks_per_day must be non-zero")]
    ZeroBlocksPerDay,
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
