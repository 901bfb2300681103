//! Kiroku - tiered-storage lifecycle manager for continuous video recording
//!
//! Continuously captures video as bounded-duration chunks on a fast local
//! tier, relocates completed chunks to a larger external tier on a
//! schedule with copy-verify-delete semantics, monitors free space, and
//! ages chunks out of the external tier.
//!
//! Module map:
//!
//! - `chunk`: chunk model, tiers, filename convention
//! - `storage`: catalog, monitor, retention sweeper, transfer worker
//! - `capture`: `CaptureBackend` trait, process + test-source backends,
//!   supervisor
//! - `recorder`: top-level orchestrator with the flush-on-every-exit-path
//!   guarantee
//! - `process`: process-group child handling for external backends

pub mod capture;
pub mod chunk;
pub mod config;
pub mod error;
pub mod process;
pub mod recorder;
pub mod storage;

pub use capture::{
    ActiveChunkHandle, BackendExit, CaptureBackend, CaptureConfig, CaptureSupervisor,
    ProcessBackend, SupervisorState, TestSourceBackend,
};
pub use chunk::{Chunk, Tier};
pub use config::RecorderConfig;
pub use error::SessionError;
pub use recorder::Recorder;
pub use storage::{
    ChunkCatalog, RetentionSweeper, SpaceReport, SpaceStatus, TransferCycleError, TransferRecord,
    TransferSummary, TransferWorker,
};
