//! Sync engine: follows the block source and feeds the mapper.
//!
//! ```text
//!   BlockSource ──fetch task──▶ mpsc(prefetch_blocks) ──apply loop──▶ Mapper ──▶ Storage
//!        ▲  retry + backoff                                  │
//!        └────────── head - confirmations ◀──────────────────┘ (checkpoint)
//! ```
//!
//! The fetch task runs ahead so block N+1 is fetched while block N commits;
//! the apply loop is the only writer and consumes blocks strictly in order.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::mapper::Mapper;
use crate::source::{Block, BlockSource};
use crate::storage::Storage;

/// Capped exponential backoff for source calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryStrategy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound of any delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Failed attempts tolerated before giving up; 0 retries forever.
    pub max_attempts: u32,
}

impl RetryStrategy {
    /// Strategy described by the `[sync]` section.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            multiplier: 2.0,
            max_attempts: config.max_fetch_attempts,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Run `call` until it succeeds, the strategy gives up, or `cancel` fires.
///
/// `Ok(None)` means cancelled.
async fn with_retry<T, F, Fut>(
    strategy: &RetryStrategy,
    cancel: &CancellationToken,
    what: &str,
    mut call: F,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(Some(value)),
            Err(e) => {
                attempt += 1;
                if strategy.exhausted(attempt) {
                    return Err(e)
                        .with_context(|| format!("{} failed after {} attempts", what, attempt));
                }
                let delay = strategy.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "{} failed; retrying",
                    what
                );
                if !pause(cancel, delay).await {
                    return Ok(None);
                }
            }
        }
    }
}

/// Sync engine: historical catch-up followed by live polling.
pub struct SyncEngine {
    source: Arc<dyn BlockSource>,
    storage: Storage,
    mapper: Mapper,
    config: SyncConfig,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(
        source: Arc<dyn BlockSource>,
        storage: Storage,
        mapper: Mapper,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            storage,
            mapper,
            config,
        }
    }

    /// Run until `cancel` fires or a fatal error occurs.
    ///
    /// Cancellation is honoured between blocks only: the block being applied
    /// always commits or rolls back as a whole. Reorgs, append conflicts and
    /// exhausted fetch retries are fatal.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let next = self
            .storage
            .get_sync_state()
            .await?
            .next_height(self.config.start_block);

        info!(
            next,
            confirmations = self.config.confirmations,
            batch_size = self.config.batch_size,
            "Sync engine starting"
        );

        let (tx, mut rx) = mpsc::channel::<Block>(self.config.prefetch_blocks.max(1));
        let fetch_cancel = cancel.child_token();
        let fetcher = tokio::spawn(fetch_loop(
            Arc::clone(&self.source),
            next,
            self.config.clone(),
            tx,
            fetch_cancel.clone(),
        ));

        let applied = self.apply_loop(&mut rx, &cancel).await;

        fetch_cancel.cancel();
        drop(rx);
        let fetched = fetcher.await.context("Fetch task panicked")?;

        applied?;
        fetched?;

        info!("Sync engine stopped");
        Ok(())
    }

    async fn apply_loop(
        &self,
        rx: &mut mpsc::Receiver<Block>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut since_report = 0u64;

        loop {
            let block = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Stop requested; halting between blocks");
                    return Ok(());
                }
                block = rx.recv() => block,
            };

            // The fetch task ended; its result explains why.
            let Some(block) = block else {
                return Ok(());
            };

            let report = self
                .mapper
                .apply_block(&self.storage, &block)
                .await
                .with_context(|| format!("Failed to apply block {}", block.height))?;

            if !report.already_applied {
                since_report += 1;
                if since_report >= self.config.batch_size {
                    info!(height = report.height, blocks = since_report, "Sync progress");
                    since_report = 0;
                }
            }
        }
    }
}

async fn fetch_loop(
    source: Arc<dyn BlockSource>,
    mut next: u64,
    config: SyncConfig,
    tx: mpsc::Sender<Block>,
    cancel: CancellationToken,
) -> Result<()> {
    let strategy = RetryStrategy::from_config(&config);
    let poll = Duration::from_secs(config.poll_interval_secs);

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let Some(head) = with_retry(&strategy, &cancel, "Fetching head", || source.head()).await?
        else {
            return Ok(());
        };

        let safe = head.and_then(|h| h.checked_sub(config.confirmations));
        let batch_end = next.saturating_add(config.batch_size.max(1) - 1);
        let to = match safe {
            Some(safe) if safe >= next => safe.min(batch_end),
            _ => {
                debug!(next, ?head, "Caught up; waiting for new blocks");
                if !pause(&cancel, poll).await {
                    return Ok(());
                }
                continue;
            }
        };

        let what = format!("Fetching blocks {}..={}", next, to);
        let Some(blocks) = with_retry(&strategy, &cancel, &what, || source.blocks(next, to)).await?
        else {
            return Ok(());
        };

        debug!(from = next, to, blocks = blocks.len(), "Fetched range");

        for block in blocks {
            if block.height < next || block.height > to {
                warn!(
                    height = block.height,
                    from = next,
                    to,
                    "Source returned a block outside the range"
                );
                continue;
            }
            if tx.send(block).await.is_err() {
                // Apply loop is gone.
                return Ok(());
            }
        }

        next = to + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(max_attempts: u32) -> RetryStrategy {
        RetryStrategy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            multiplier: 2.0,
            max_attempts,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let s = strategy(0);
        assert_eq!(s.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(s.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(s.delay_for_attempt(4), Duration::from_millis(800));
        assert_eq!(s.delay_for_attempt(5), Duration::from_millis(1_000));
        assert_eq!(s.delay_for_attempt(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_from_config() {
        let config = SyncConfig {
            initial_backoff_ms: 250,
            max_backoff_ms: 4_000,
            max_fetch_attempts: 3,
            ..Default::default()
        };
        let s = RetryStrategy::from_config(&config);
        assert_eq!(s.initial_delay, Duration::from_millis(250));
        assert_eq!(s.max_delay, Duration::from_secs(4));
        assert_eq!(s.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_with_retry_recovers() {
        let cancel = CancellationToken::new();
        let s = RetryStrategy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..strategy(0)
        };

        let mut calls = 0;
        let value = with_retry(&s, &cancel, "flaky", || {
            calls += 1;
            let ok = calls >= 3;
            async move {
                if ok {
                    Ok(42)
                } else {
                    anyhow::bail!("down")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, Some(42));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let cancel = CancellationToken::new();
        let s = RetryStrategy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            ..strategy(2)
        };

        let err = with_retry(&s, &cancel, "dead", || async {
            Err::<(), _>(anyhow::anyhow!("down"))
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("after 2 attempts"));
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = with_retry(&strategy(0), &cancel, "down", || async {
            Err::<(), _>(anyhow::anyhow!("down"))
        })
        .await
        .unwrap();
        assert!(out.is_none());
    }
}
