//! Storage monitor
//!
//! Free-space reading for a tier, classified against the tier's low-space
//! threshold. Advisory only: a failed reading (e.g. the mount point
//! disappeared) is reported as low, never propagated as an error, so the
//! capture path is never blocked by a storage check.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::chunk::Tier;

/// Classification of a tier's free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceStatus {
    Ok,
    Low,
}

/// One free-space reading for a tier.
#[derive(Debug, Clone, Copy)]
pub struct SpaceReport {
    pub free_bytes: u64,
    pub status: SpaceStatus,
}

/// Read free space for `path` and classify it against `tier`'s threshold.
pub async fn check(tier: Tier, path: &Path) -> SpaceReport {
    match free_space(path).await {
        Ok(free_bytes) => {
            let status = if free_bytes < tier.low_space_threshold() {
                warn!(
                    "low {} storage space: {:.1} GB free",
                    tier,
                    free_bytes as f64 / 1e9
                );
                SpaceStatus::Low
            } else {
                SpaceStatus::Ok
            };
            SpaceReport { free_bytes, status }
        }
        Err(e) => {
            warn!(%tier, path = %path.display(), "storage check failed: {e}");
            SpaceReport {
                free_bytes: 0,
                status: SpaceStatus::Low,
            }
        }
    }
}

/// Available bytes on the filesystem containing `path`.
pub async fn free_space(path: &Path) -> Result<u64> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || statvfs_free(&path))
        .await
        .context("storage check task failed")?
}

#[cfg(unix)]
fn statvfs_free(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).context("path contains NUL")?;
    unsafe {
        let mut stat: libc::statvfs = std::mem::zeroed();
        if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
            anyhow::bail!("statvfs failed: {}", std::io::Error::last_os_error());
        }
        #[allow(clippy::unnecessary_cast)]
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }
}

#[cfg(not(unix))]
fn statvfs_free(_path: &Path) -> Result<u64> {
    anyhow::bail!("free-space reading is not supported on this platform");
}
