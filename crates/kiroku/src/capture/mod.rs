//! Capture backends
//!
//! The lifecycle/transfer/retention core is written once against the
//! [`CaptureBackend`] trait. Two implementations are provided:
//!
//! - [`ProcessBackend`]: drives `rpicam-vid` as an external process
//! - [`TestSourceBackend`]: synthetic chunk producer for development
//!   machines and the e2e suite, no hardware required

pub mod process;
pub mod supervisor;
pub mod test_source;

pub use process::ProcessBackend;
pub use supervisor::{CaptureSupervisor, SupervisorState};
pub use test_source::TestSourceBackend;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::chunk;

/// Settings handed to a capture backend at start.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Directory on the local tier chunks are written into.
    pub output_dir: PathBuf,
    /// Duration of one segment before rollover.
    pub chunk_duration: Duration,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub framerate: u32,
    pub preview: bool,
}

/// Terminal state of a backend, with captured output for diagnosis.
#[derive(Debug, Clone)]
pub struct BackendExit {
    /// Human-readable exit status (e.g. `exit status: 1`).
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl BackendExit {
    /// Combined diagnostics suitable for an error report.
    pub fn diagnostics(&self) -> String {
        format!("stdout: {}\nstderr: {}", self.stdout.trim(), self.stderr.trim())
    }
}

/// A source of chunk files on the local tier.
///
/// Implementations own the segment index: [`CaptureBackend::active_handle`]
/// must always point at the file currently open for writing, derived from
/// the output pattern and segment index, never inferred from filesystem
/// timestamps.
#[async_trait]
pub trait CaptureBackend: Send {
    /// Launch the backend. An error here means it never started.
    async fn start(&mut self, config: &CaptureConfig) -> Result<()>;

    /// Non-blocking liveness poll. `Ok(None)` while running; `Ok(Some)`
    /// once the backend has exited, with its captured output.
    fn try_wait(&mut self) -> Result<Option<BackendExit>>;

    /// Shared handle to the chunk currently being written.
    fn active_handle(&self) -> ActiveChunkHandle;

    /// Stop the backend, gracefully up to `timeout`, forcibly after.
    /// Must clear the active handle.
    async fn stop(&mut self, timeout: Duration) -> Result<()>;
}

/// The single authoritative reference to the chunk in `Recording` state.
///
/// Cheap to clone; the transfer worker re-reads it at the start of every
/// cycle. `None` means no recording is in progress and every chunk on the
/// local tier is eligible for transfer.
#[derive(Debug, Clone, Default)]
pub struct ActiveChunkHandle {
    inner: Arc<Mutex<ActiveChunk>>,
}

#[derive(Debug, Default)]
enum ActiveChunk {
    /// No recording in progress.
    #[default]
    Idle,
    /// Explicitly tracked path, updated by the backend at each rollover.
    Path(PathBuf),
    /// Rolling schedule: the active segment index is derived from the
    /// monotonic clock and the segment duration.
    Schedule {
        dir: PathBuf,
        stamp: String,
        started: Instant,
        segment: Duration,
    },
}

impl ActiveChunkHandle {
    /// Path of the chunk expected to be open for writing right now.
    pub fn current(&self) -> Option<PathBuf> {
        match &*self.inner.lock().unwrap() {
            ActiveChunk::Idle => None,
            ActiveChunk::Path(path) => Some(path.clone()),
            ActiveChunk::Schedule {
                dir,
                stamp,
                started,
                segment,
            } => {
                let index = (started.elapsed().as_millis() / segment.as_millis().max(1)) as u32;
                Some(chunk::chunk_path(dir, stamp, index))
            }
        }
    }

    /// Mark no recording in progress.
    pub fn clear(&self) {
        *self.inner.lock().unwrap() = ActiveChunk::Idle;
    }

    /// Point the handle at an explicit path.
    pub fn set_path(&self, path: PathBuf) {
        *self.inner.lock().unwrap() = ActiveChunk::Path(path);
    }

    /// Start a rolling schedule anchored at the current instant.
    pub fn set_schedule(&self, dir: &Path, stamp: &str, segment: Duration) {
        *self.inner.lock().unwrap() = ActiveChunk::Schedule {
            dir: dir.to_path_buf(),
            stamp: stamp.to_string(),
            started: Instant::now(),
            segment,
        };
    }
}
