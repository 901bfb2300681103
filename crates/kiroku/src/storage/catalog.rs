//! Chunk catalog
//!
//! Stateless scan over one tier directory, producing `Chunk` records for
//! every file matching the naming convention. Sorted by filename, which is
//! chronological order by construction.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::chunk::{self, Chunk};

/// Enumerates chunk files on a single tier.
#[derive(Debug, Clone)]
pub struct ChunkCatalog {
    root: PathBuf,
}

impl ChunkCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List all chunk files under the tier root, oldest first.
    ///
    /// Files that disappear between listing and stat (e.g. deleted by a
    /// concurrent sweep) are skipped, not errors.
    pub fn scan(&self) -> Result<Vec<Chunk>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("failed to read tier directory {}", self.root.display()))?;

        let mut chunks = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !chunk::is_chunk_name(name) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let created_at = chunk::parse_created_at(name).unwrap_or(modified);
            chunks.push(Chunk {
                path,
                created_at,
                size_bytes: meta.len(),
                modified,
            });
        }

        chunks.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            tier = %self.root.display(),
            count = chunks.len(),
            "catalog scan complete"
        );
        Ok(chunks)
    }
}
