//! Retention sweeper
//!
//! Bounds external-tier growth by deleting chunks strictly older than the
//! configured age, measured by file modification time. Deletion failures
//! are logged and skipped; the next sweep retries them. Re-running with no
//! eligible files is a no-op.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use crate::chunk::Chunk;
use crate::storage::catalog::ChunkCatalog;

/// Outcome of one sweep invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepSummary {
    pub deleted: usize,
    pub failed: usize,
    pub bytes_freed: u64,
}

/// Deletes chunks from one tier once their age exceeds `max_age`.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    catalog: ChunkCatalog,
    max_age: Duration,
}

impl RetentionSweeper {
    pub fn new(root: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            catalog: ChunkCatalog::new(root),
            max_age,
        }
    }

    /// Delete every chunk strictly older than `max_age`.
    ///
    /// A missing tier directory is treated as nothing-to-sweep rather than
    /// an error, matching an unmounted external drive at startup.
    pub fn sweep(&self) -> Result<SweepSummary> {
        if !self.catalog.root().is_dir() {
            info!(
                tier = %self.catalog.root().display(),
                "retention sweep skipped, tier not present"
            );
            return Ok(SweepSummary::default());
        }

        let chunks = self.catalog.scan()?;
        let now = SystemTime::now();
        let expired = select_expired(&chunks, now, self.max_age);

        if expired.is_empty() {
            return Ok(SweepSummary::default());
        }

        let mut summary = SweepSummary::default();
        info!(count = expired.len(), "cleaning up old chunks");
        for chunk in expired {
            match fs::remove_file(&chunk.path) {
                Ok(()) => {
                    summary.deleted += 1;
                    summary.bytes_freed += chunk.size_bytes;
                    info!(file = chunk.name(), "deleted old chunk");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(file = chunk.name(), "failed to delete old chunk: {e}");
                }
            }
        }
        Ok(summary)
    }
}

/// Chunks whose age strictly exceeds `max_age`; boundary-age files stay.
fn select_expired(chunks: &[Chunk], now: SystemTime, max_age: Duration) -> Vec<&Chunk> {
    chunks
        .iter()
        .filter(|c| match now.duration_since(c.modified) {
            Ok(age) => age > max_age,
            // Modified in the future (clock skew): never expired.
            Err(_) => false,
        })
        .collect()
}
