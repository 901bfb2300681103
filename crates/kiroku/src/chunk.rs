//! Chunk model and filename convention
//!
//! A chunk is one bounded-duration video segment file. Chunks are named
//! `video_<YYYYMMDD>_<HHMMSS>_<NNNN>.h264` (session start timestamp plus a
//! zero-padded rolling segment index), so a lexicographic sort of
//! filenames is also a chronological sort.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File extension used for all chunk files.
pub const CHUNK_EXT: &str = "h264";

/// Storage location class for a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Fast, small tier the capture backend writes to (e.g. SD card).
    Local,
    /// Large, slow tier chunks are relocated to (e.g. USB drive).
    External,
}

impl Tier {
    /// Free-space level below which the tier is reported as low.
    pub fn low_space_threshold(&self) -> u64 {
        match self {
            Tier::Local => 2 * 1024 * 1024 * 1024,    // 2 GiB
            Tier::External => 5 * 1024 * 1024 * 1024, // 5 GiB
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Local => "local",
            Tier::External => "external",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single chunk file as observed on disk.
///
/// Lifecycle (`Recording → Completed → Transferred → Retired`) is not
/// stored here: the filesystem is the source of truth, and each transition
/// is owned by exactly one component (supervisor, transfer worker,
/// retention sweeper).
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Absolute path of the chunk file.
    pub path: PathBuf,
    /// Session timestamp parsed from the filename, falling back to mtime.
    pub created_at: SystemTime,
    /// File size in bytes at scan time.
    pub size_bytes: u64,
    /// Filesystem modification time.
    pub modified: SystemTime,
}

impl Chunk {
    /// Filename portion of the chunk path.
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<invalid>")
    }
}

/// Session timestamp string used in chunk filenames, e.g. `20250807_153033`.
pub fn session_stamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// Filename for segment `index` of the session started at `stamp`.
pub fn chunk_filename(stamp: &str, index: u32) -> String {
    format!("video_{stamp}_{index:04}.{CHUNK_EXT}")
}

/// Full path for segment `index` of a session recording into `dir`.
pub fn chunk_path(dir: &Path, stamp: &str, index: u32) -> PathBuf {
    dir.join(chunk_filename(stamp, index))
}

/// Output pattern handed to the capture backend (`%04d` rolling index).
pub fn output_pattern(dir: &Path, stamp: &str) -> PathBuf {
    dir.join(format!("video_{stamp}_%04d.{CHUNK_EXT}"))
}

/// Whether `name` looks like a chunk file produced by this recorder.
pub fn is_chunk_name(name: &str) -> bool {
    name.starts_with("video_") && name.ends_with(&format!(".{CHUNK_EXT}"))
}

/// Parse the session timestamp out of a chunk filename.
///
/// Returns `None` for names that do not follow the convention; callers
/// fall back to the file's mtime.
pub fn parse_created_at(name: &str) -> Option<SystemTime> {
    let stem = name
        .strip_prefix("video_")?
        .strip_suffix(&format!(".{CHUNK_EXT}"))?;
    // stem = "<YYYYMMDD>_<HHMMSS>_<NNNN>"
    let (stamp, index) = stem.rsplit_once('_')?;
    if index.len() < 4 || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").ok()?;
    let local = Local.from_local_datetime(&naive).single()?;
    Some(SystemTime::from(local))
}
