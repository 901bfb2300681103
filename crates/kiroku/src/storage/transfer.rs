//! Transfer worker
//!
//! Moves completed chunks from the local tier to the external tier with
//! copy-verify-delete semantics. The chunk currently being written is
//! excluded by consulting the active-chunk handle at the start of every
//! cycle; a source file is deleted only after the destination is verified
//! to have the same size. Per-file failures leave the source in place and
//! are retried on the next cycle; an unavailable external tier aborts the
//! whole cycle before any file is touched.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::ActiveChunkHandle;
use crate::storage::catalog::ChunkCatalog;

/// Result of one transfer attempt for one chunk. Emitted through the log
/// and aggregated into a [`TransferSummary`]; never persisted.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub name: String,
    pub bytes_copied: u64,
    pub error: Option<String>,
}

impl TransferRecord {
    pub fn verified(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate outcome of one transfer cycle.
#[derive(Debug, Default)]
pub struct TransferSummary {
    pub records: Vec<TransferRecord>,
    pub transferred: usize,
    pub failed: usize,
    pub bytes_moved: u64,
}

/// Errors that abort a whole cycle (as opposed to one file).
#[derive(Debug, Error)]
pub enum TransferCycleError {
    #[error("external tier unavailable at {}", .0.display())]
    TierUnavailable(PathBuf),
    #[error("failed to scan local tier: {0:#}")]
    Scan(anyhow::Error),
}

/// Relocates completed chunks from the local to the external tier.
#[derive(Debug, Clone)]
pub struct TransferWorker {
    catalog: ChunkCatalog,
    external: PathBuf,
    active: ActiveChunkHandle,
}

impl TransferWorker {
    pub fn new(
        local: impl Into<PathBuf>,
        external: impl Into<PathBuf>,
        active: ActiveChunkHandle,
    ) -> Self {
        Self {
            catalog: ChunkCatalog::new(local),
            external: external.into(),
            active,
        }
    }

    /// Run one transfer cycle over all eligible completed chunks.
    ///
    /// The active handle is re-read here, at cycle start, so the
    /// eligibility snapshot is never staler than the latest rollover.
    pub async fn run_cycle(&self) -> Result<TransferSummary, TransferCycleError> {
        if !self.external.is_dir() {
            warn!(
                tier = %self.external.display(),
                "external storage not accessible, skipping transfer cycle"
            );
            return Err(TransferCycleError::TierUnavailable(self.external.clone()));
        }

        let chunks = self.catalog.scan().map_err(TransferCycleError::Scan)?;
        let active = self.active.current();

        let mut summary = TransferSummary::default();
        for chunk in &chunks {
            if active.as_deref() == Some(chunk.path.as_path()) {
                debug!(file = chunk.name(), "skipping active chunk");
                continue;
            }

            let record = match self.transfer_one(&chunk.path).await {
                Ok(bytes) => {
                    info!(file = chunk.name(), bytes, "transferred chunk");
                    TransferRecord {
                        name: chunk.name().to_string(),
                        bytes_copied: bytes,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(file = chunk.name(), "transfer failed: {e:#}");
                    TransferRecord {
                        name: chunk.name().to_string(),
                        bytes_copied: 0,
                        error: Some(format!("{e:#}")),
                    }
                }
            };
            if record.verified() {
                summary.transferred += 1;
                summary.bytes_moved += record.bytes_copied;
            } else {
                summary.failed += 1;
            }
            summary.records.push(record);
        }

        if summary.transferred > 0 || summary.failed > 0 {
            info!(
                "transfer cycle complete: {} files moved, {} failed, {:.2} GB",
                summary.transferred,
                summary.failed,
                summary.bytes_moved as f64 / 1e9
            );
        } else {
            info!("no chunks ready for transfer");
        }
        Ok(summary)
    }

    /// Periodic cycle loop: one cycle per interval, at most one at a time.
    /// Ticks elapsing while a cycle runs are skipped, not queued. Returns
    /// when cancelled; the shutdown flush is driven by the orchestrator.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval = ?interval, "transfer worker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("transfer worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!("transfer cycle aborted: {e}");
                    }
                }
            }
        }
    }

    /// Copy one chunk to the external tier, verify, delete the source.
    async fn transfer_one(&self, src: &Path) -> Result<u64> {
        let name = src
            .file_name()
            .context("chunk path has no file name")?;
        let dest = self.external.join(name);

        tokio::fs::copy(src, &dest)
            .await
            .with_context(|| format!("copy to {}", dest.display()))?;

        verify_and_remove(src, &dest).await
    }
}

/// Delete `src` if and only if `dest` exists with an identical size.
///
/// On mismatch both files are left in place; the next cycle's copy
/// truncates and rewrites the destination.
async fn verify_and_remove(src: &Path, dest: &Path) -> Result<u64> {
    let src_len = tokio::fs::metadata(src)
        .await
        .context("stat source after copy")?
        .len();
    let dest_len = tokio::fs::metadata(dest)
        .await
        .context("stat destination after copy")?
        .len();

    if src_len != dest_len {
        bail!("verification failed: source {src_len} bytes, destination {dest_len} bytes");
    }

    tokio::fs::remove_file(src)
        .await
        .context("remove source after verified copy")?;
    Ok(src_len)
}
