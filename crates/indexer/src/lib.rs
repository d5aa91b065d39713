//! Memopark chain event indexer.
//!
//! This crate provides:
//! - A block source abstraction (JSONL archive exports, in-memory blocks)
//! - Decoding of raw chain events into a closed set of known signatures
//! - A mapper that folds each block into entity projections and append-only
//!   history logs inside one transaction
//! - Rollups (daily arbitration counters, grave offering totals, pin billing)
//! - A sync engine with prefetch, retry with backoff and soft stop
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  memopark-indexer (this)                      │
//! │                                               │
//! │  ┌──────────────┐      ┌──────────────────┐   │
//! │  │ BlockSource  │ ───▶ │ SyncEngine       │   │
//! │  │ (jsonl/mem)  │      │ fetch ▶ mpsc ▶   │   │
//! │  └──────────────┘      └────────┬─────────┘   │
//! │                                 │ Block       │
//! │                        ┌────────▼─────────┐   │
//! │                        │ Mapper           │   │
//! │                        │ decode ▶ handler │   │
//! │                        │ ▶ rollup         │   │
//! │                        └────────┬─────────┘   │
//! │                                 │ StoreTx     │
//! │                        ┌────────▼─────────┐   │
//! │                        │ Storage (SQLite) │   │
//! │                        │ projections      │   │
//! │                        │ action logs      │   │
//! │                        │ notifications    │   │
//! │                        │ checkpoint       │   │
//! │                        └──────────────────┘   │
//! └───────────────────────────────────────────────┘
//!          │
//!          │ Shared DB (read-only consumers)
//!          ▼
//! ```
//!
//! # Write discipline
//!
//! The mapper is the only writer. Every block is applied in one transaction
//! that also advances the checkpoint, so readers see whole blocks only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod events;
pub mod mapper;
pub mod rollup;
pub mod source;
pub mod storage;
pub mod sync;

// Re-export common types
pub use error::{AppendConflict, DecodeError, ReorgDetected};
pub use mapper::{BlockReport, Mapper};
pub use memopark_core::*;
