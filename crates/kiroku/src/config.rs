//! Recorder configuration
//!
//! All knobs with their defaults. The binary fills this from `KIROKU_*`
//! environment variables and command-line flags; the library only sees the
//! resulting struct.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a recording session.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Fast tier the capture backend writes chunks to.
    pub local_path: PathBuf,
    /// Slow tier completed chunks are relocated to.
    pub external_path: PathBuf,
    /// Duration of one video chunk.
    pub chunk_duration: Duration,
    /// Period of the background transfer cycle.
    pub transfer_interval: Duration,
    /// Video width in pixels.
    pub width: u32,
    /// Video height in pixels.
    pub height: u32,
    /// Video bitrate in bits per second.
    pub bitrate: u32,
    /// Video framerate in frames per second.
    pub framerate: u32,
    /// Age beyond which external-tier chunks are deleted.
    pub retention: Duration,
    /// Optional period for re-running the retention sweep while recording.
    /// `None` keeps the sweep startup-only.
    pub sweep_interval: Option<Duration>,
    /// Show a live camera preview.
    pub preview: bool,
    /// Interval between backend liveness polls / storage checks.
    pub liveness_poll: Duration,
    /// Grace period for the backend to stop before it is killed.
    pub stop_timeout: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            local_path: PathBuf::from("/var/lib/kiroku/chunks"),
            external_path: PathBuf::from("/mnt/external/kiroku"),
            chunk_duration: Duration::from_secs(20 * 60),
            transfer_interval: Duration::from_secs(12 * 3600),
            width: 1920,
            height: 1080,
            bitrate: 10_000_000,
            framerate: 30,
            retention: Duration::from_secs(30 * 24 * 3600),
            sweep_interval: None,
            preview: false,
            liveness_poll: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

impl RecorderConfig {
    /// Reject configurations the capture backend or the lifecycle loops
    /// cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("resolution must be non-zero, got {}x{}", self.width, self.height);
        }
        if self.framerate == 0 {
            bail!("framerate must be non-zero");
        }
        if self.chunk_duration.is_zero() {
            bail!("chunk duration must be non-zero");
        }
        if self.transfer_interval.is_zero() {
            bail!("transfer interval must be non-zero");
        }
        if self.local_path == self.external_path {
            bail!(
                "local and external storage must be different paths ({})",
                self.local_path.display()
            );
        }
        Ok(())
    }
}

/// Parse a `WxH` resolution string such as `1920x1080`.
pub fn parse_resolution(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s
        .split_once('x')
        .with_context(|| format!("invalid resolution '{s}', expected WxH like 1920x1080"))?;
    let width: u32 = w
        .parse()
        .with_context(|| format!("invalid resolution width '{w}'"))?;
    let height: u32 = h
        .parse()
        .with_context(|| format!("invalid resolution height '{h}'"))?;
    if width == 0 || height == 0 {
        bail!("resolution must be non-zero, got {s}");
    }
    Ok((width, height))
}

/// Parse a fractional hour count (e.g. `12`, `0.5`) into a duration.
pub fn parse_hours(s: &str) -> Result<Duration> {
    let hours: f64 = s
        .parse()
        .with_context(|| format!("invalid hour value '{s}'"))?;
    if !hours.is_finite() || hours <= 0.0 {
        bail!("hour value must be positive, got {s}");
    }
    Ok(Duration::from_secs_f64(hours * 3600.0))
}
