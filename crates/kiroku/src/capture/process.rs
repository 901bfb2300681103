//! rpicam-vid capture backend
//!
//! Drives the camera stack's segmented recording mode as an external
//! process: one H.264 file per segment boundary, no gaps between chunks.
//! The process runs in its own group so its helper children terminate
//! with it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use std::time::Duration;
use tracing::info;

use super::{ActiveChunkHandle, BackendExit, CaptureBackend, CaptureConfig};
use crate::chunk;
use crate::process::ProcessHandle;

/// Default capture program on Raspberry Pi OS.
pub const DEFAULT_PROGRAM: &str = "rpicam-vid";

/// Capture backend running an external segmenting recorder process.
pub struct ProcessBackend {
    program: String,
    handle: Option<ProcessHandle>,
    active: ActiveChunkHandle,
}

impl ProcessBackend {
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Use a different capture program (tests substitute one here).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            handle: None,
            active: ActiveChunkHandle::default(),
        }
    }

    fn build_args(config: &CaptureConfig, stamp: &str) -> Vec<String> {
        let pattern = chunk::output_pattern(&config.output_dir, stamp);
        let mut args = vec![
            "-t".to_string(),
            "0".to_string(), // Record indefinitely
            "--segment".to_string(),
            config.chunk_duration.as_millis().to_string(),
            "-o".to_string(),
            pattern.to_string_lossy().into_owned(),
            "--width".to_string(),
            config.width.to_string(),
            "--height".to_string(),
            config.height.to_string(),
            "--bitrate".to_string(),
            config.bitrate.to_string(),
            "--framerate".to_string(),
            config.framerate.to_string(),
            "--codec".to_string(),
            "h264".to_string(),
            "--inline".to_string(), // SPS/PPS with each segment
            "--flush".to_string(),  // Flush each segment immediately
        ];
        if !config.preview {
            args.push("--nopreview".to_string());
        }
        args
    }
}

impl Default for ProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for ProcessBackend {
    async fn start(&mut self, config: &CaptureConfig) -> Result<()> {
        let stamp = chunk::session_stamp(Local::now());
        let args = Self::build_args(config, &stamp);

        info!(
            "starting capture: {} {}",
            self.program,
            args.join(" ")
        );

        let handle = ProcessHandle::spawn(&self.program, &args, None)
            .with_context(|| format!("failed to start capture backend '{}'", self.program))?;

        // The segment index rolls with wall time from here on.
        self.active
            .set_schedule(&config.output_dir, &stamp, config.chunk_duration);
        self.handle = Some(handle);
        Ok(())
    }

    fn try_wait(&mut self) -> Result<Option<BackendExit>> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(None);
        };
        match handle.try_wait()? {
            None => Ok(None),
            Some(status) => {
                let (stdout, stderr) = handle.output();
                self.active.clear();
                self.handle = None;
                Ok(Some(BackendExit {
                    status: status.to_string(),
                    stdout,
                    stderr,
                }))
            }
        }
    }

    fn active_handle(&self) -> ActiveChunkHandle {
        self.active.clone()
    }

    async fn stop(&mut self, timeout: Duration) -> Result<()> {
        // Stop accepting the schedule first: the final segment is treated
        // as completed once the process is asked to close it.
        self.active.clear();
        if let Some(mut handle) = self.handle.take() {
            let status = handle.request_stop(timeout).await?;
            info!("capture backend stopped ({status})");
        }
        Ok(())
    }
}
