//! In-process block source.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{Block, BlockSource};

#[derive(Debug, Default)]
struct Inner {
    blocks: BTreeMap<u64, Block>,
    failures: u32,
}

/// Blocks held in memory, for embedding the indexer and for tests.
///
/// Clones share the same block set.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source preloaded with `blocks`.
    pub async fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let source = Self::new();
        for block in blocks {
            source.push(block).await;
        }
        source
    }

    /// Add or replace the block at its height.
    pub async fn push(&self, block: Block) {
        self.inner.lock().await.blocks.insert(block.height, block);
    }

    /// Make the next `count` calls fail as if the node were unreachable.
    pub async fn fail_next(&self, count: u32) {
        self.inner.lock().await.failures = count;
    }

    async fn take_failure(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.failures > 0 {
            inner.failures -= 1;
            bail!("memory source: simulated outage");
        }
        Ok(())
    }
}

#[async_trait]
impl BlockSource for MemorySource {
    async fn head(&self) -> Result<Option<u64>> {
        self.take_failure().await?;
        Ok(self.inner.lock().await.blocks.keys().next_back().copied())
    }

    async fn blocks(&self, from: u64, to: u64) -> Result<Vec<Block>> {
        self.take_failure().await?;
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .inner
            .lock()
            .await
            .blocks
            .range(from..=to)
            .map(|(_, block)| block.clone())
            .collect())
    }
}
