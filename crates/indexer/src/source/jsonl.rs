//! Block archive in JSON Lines form: one [`Block`] per line.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Block, BlockSource};

/// Reads blocks from a JSON Lines file.
///
/// The file is re-read on every call, so lines appended by an exporter are
/// picked up by the next poll.
#[derive(Debug, Clone)]
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    /// Source backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<Block>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read block archive: {}", self.path.display()))?;

        let mut blocks = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let block: Block = serde_json::from_str(line).with_context(|| {
                format!("Invalid block on line {} of {}", line_no + 1, self.path.display())
            })?;
            blocks.push(block);
        }

        // Exporters may write out of order; delivery must not be.
        blocks.sort_by_key(|b| b.height);

        debug!(count = blocks.len(), path = %self.path.display(), "Loaded block archive");
        Ok(blocks)
    }
}

#[async_trait]
impl BlockSource for JsonlSource {
    async fn head(&self) -> Result<Option<u64>> {
        Ok(self.load().await?.last().map(|b| b.height))
    }

    async fn blocks(&self, from: u64, to: u64) -> Result<Vec<Block>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|b| b.height >= from && b.height <= to)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_reads_range_in_height_order() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"height": 3, "events": []}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"height": 1, "events": []}}"#).unwrap();
        writeln!(file, r#"{{"height": 2}}"#).unwrap();

        let source = JsonlSource::new(file.path());
        assert_eq!(source.head().await.unwrap(), Some(3));

        let heights: Vec<u64> = source
            .blocks(2, 3)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.height)
            .collect();
        assert_eq!(heights, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_empty_archive_has_no_head() {
        let file = NamedTempFile::new().unwrap();
        let source = JsonlSource::new(file.path());
        assert_eq!(source.head().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_extrinsic_hash_keeps_archive_readable() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"height": 1, "events": [{{"name": "OtcListing.ListingCanceled", "args": {{"id": 7}}, "extrinsicHash": "0x1234"}}]}}"#
        )
        .unwrap();
        writeln!(file, r#"{{"height": 2, "events": []}}"#).unwrap();

        let source = JsonlSource::new(file.path());
        assert_eq!(source.head().await.unwrap(), Some(2));
        assert_eq!(source.blocks(2, 2).await.unwrap().len(), 1);

        let first = source.blocks(1, 1).await.unwrap();
        assert_eq!(first[0].events.len(), 1);
        assert_eq!(first[0].events[0].extrinsic_hash, None);
    }

    #[tokio::test]
    async fn test_bad_line_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();

        let source = JsonlSource::new(file.path());
        let err = source.head().await.unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
