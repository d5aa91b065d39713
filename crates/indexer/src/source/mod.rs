//! Chain data sources.
//!
//! A source hands out blocks in ascending height order. It may omit heights
//! that carry no events; it never reorders them.

use alloy_primitives::B256;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlSource;
pub use memory::MemorySource;

/// One block as delivered by the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    #[serde(alias = "number")]
    pub height: u64,

    /// Block hash, when the source reports one.
    #[serde(default)]
    pub hash: Option<B256>,

    /// Parent block hash, when the source reports one.
    #[serde(default, alias = "parentHash")]
    pub parent_hash: Option<B256>,

    /// Events in the order the chain emitted them. Entries that do not
    /// decode as an event are dropped with a warning.
    #[serde(default, deserialize_with = "lenient_events")]
    pub events: Vec<ChainEvent>,
}

/// One event emitted in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    /// Emitting module; may be empty when `name` is dotted.
    #[serde(default, alias = "pallet", alias = "section")]
    pub module: String,

    /// Event name, either bare or `Module.Event`.
    #[serde(alias = "method")]
    pub name: String,

    /// Event arguments: an object keyed by field name or a positional array.
    #[serde(default)]
    pub args: serde_json::Value,

    /// Hash of the extrinsic that emitted the event; `None` when absent or
    /// not a 32-byte hash.
    #[serde(default, alias = "extrinsicHash", deserialize_with = "lenient_hash")]
    pub extrinsic_hash: Option<B256>,

    /// Position of the event inside its block.
    #[serde(default, alias = "indexInBlock")]
    pub index_in_block: u32,
}

fn lenient_events<'de, D>(deserializer: D) -> std::result::Result<Vec<ChainEvent>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(position, value)| match serde_json::from_value(value) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(position, error = %e, "Dropping undecodable event");
                None
            }
        })
        .collect())
}

fn lenient_hash<'de, D>(deserializer: D) -> std::result::Result<Option<B256>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value::<B256>(value.clone()) {
        Ok(hash) => Some(hash),
        Err(e) => {
            if !value.is_null() {
                warn!(value = %value, error = %e, "Dropping malformed extrinsic hash");
            }
            None
        }
    }))
}

/// A supplier of ordered blocks.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Highest height the source can serve, `None` while it has nothing.
    async fn head(&self) -> Result<Option<u64>>;

    /// Blocks with `from <= height <= to`, ascending.
    async fn blocks(&self, from: u64, to: u64) -> Result<Vec<Block>>;
}
