//! Tiered storage lifecycle
//!
//! Everything that happens to a chunk after the capture backend finalizes
//! it: cataloging, free-space monitoring, verified relocation to the
//! external tier, and age-based retention.

pub mod catalog;
pub mod monitor;
pub mod retention;
pub mod transfer;

pub use catalog::ChunkCatalog;
pub use monitor::{SpaceReport, SpaceStatus};
pub use retention::{RetentionSweeper, SweepSummary};
pub use transfer::{TransferCycleError, TransferRecord, TransferSummary, TransferWorker};
