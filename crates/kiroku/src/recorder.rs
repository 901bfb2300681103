//! Recorder orchestrator
//!
//! Wires the supervisor, transfer worker, storage monitor, and retention
//! sweeper together and drives the session: startup sweep, capture start,
//! liveness/storage loop, and the shutdown ordering. The one contract that
//! holds on every exit path (clean stop, backend crash, or launch failure)
//! is a final transfer flush, so no chunk is ever silently stranded on the
//! local tier.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::capture::{CaptureBackend, CaptureConfig, CaptureSupervisor};
use crate::chunk::Tier;
use crate::config::RecorderConfig;
use crate::storage::{monitor, RetentionSweeper, TransferWorker};

/// Bound on waiting for background tasks at shutdown. The inline flush
/// runs regardless of whether they stopped in time.
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Top-level recording session.
pub struct Recorder {
    config: RecorderConfig,
    supervisor: CaptureSupervisor,
}

impl Recorder {
    pub fn new(config: RecorderConfig, backend: Box<dyn CaptureBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            supervisor: CaptureSupervisor::new(backend),
        })
    }

    fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            output_dir: self.config.local_path.clone(),
            chunk_duration: self.config.chunk_duration,
            width: self.config.width,
            height: self.config.height,
            bitrate: self.config.bitrate,
            framerate: self.config.framerate,
            preview: self.config.preview,
        }
    }

    /// Run the session until the backend stops or `cancel` fires.
    ///
    /// Returns `Ok` on a requested shutdown; a `SessionError` (launch
    /// failure or crash) is returned only after the shutdown sequence,
    /// including the final flush, has run.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        std::fs::create_dir_all(&self.config.local_path).with_context(|| {
            format!(
                "failed to create local storage {}",
                self.config.local_path.display()
            )
        })?;
        if let Err(e) = std::fs::create_dir_all(&self.config.external_path) {
            // The external drive may simply not be mounted yet; transfers
            // retry on their own schedule.
            warn!(
                tier = %self.config.external_path.display(),
                "could not create external storage: {e}"
            );
        }

        let sweeper = RetentionSweeper::new(&self.config.external_path, self.config.retention);
        match sweeper.sweep() {
            Ok(summary) if summary.deleted > 0 => info!(
                "startup retention sweep: removed {} chunks, {:.2} GB",
                summary.deleted,
                summary.bytes_freed as f64 / 1e9
            ),
            Ok(_) => {}
            Err(e) => warn!("startup retention sweep failed: {e:#}"),
        }

        let worker = TransferWorker::new(
            &self.config.local_path,
            &self.config.external_path,
            self.supervisor.active_handle(),
        );

        let tracker = TaskTracker::new();
        tracker.spawn(
            worker
                .clone()
                .run(self.config.transfer_interval, cancel.clone()),
        );
        if let Some(period) = self.config.sweep_interval {
            tracker.spawn(run_periodic_sweep(sweeper.clone(), period, cancel.clone()));
        }
        tracker.close();

        let capture_config = self.capture_config();
        let session_result = match self.supervisor.start(&capture_config).await {
            Err(e) => Err(e),
            Ok(()) => self.main_loop(&cancel).await,
        };

        // ── Shutdown sequence, runs on every exit path ─────────────────
        if let Err(e) = self.supervisor.stop(self.config.stop_timeout).await {
            warn!("error stopping capture backend: {e:#}");
        }
        cancel.cancel();
        if tokio::time::timeout(TASK_DRAIN_TIMEOUT, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "background tasks did not stop within {:?}, flushing inline anyway",
                TASK_DRAIN_TIMEOUT
            );
        }

        match worker.run_cycle().await {
            Ok(summary) => info!(
                transferred = summary.transferred,
                failed = summary.failed,
                "final transfer flush complete"
            ),
            Err(e) => warn!("final transfer flush aborted: {e}"),
        }

        info!("recording session ended");
        session_result.map_err(Into::into)
    }

    /// Poll backend liveness and both tiers' free space until the backend
    /// stops or shutdown is requested. The sleep is interruptible so a
    /// shutdown request wakes it promptly.
    async fn main_loop(&mut self, cancel: &CancellationToken) -> Result<(), crate::SessionError> {
        let mut poll = tokio::time::interval(self.config.liveness_poll);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested");
                    return Ok(());
                }
                _ = poll.tick() => {
                    self.supervisor.poll_liveness()?;
                    monitor::check(Tier::Local, &self.config.local_path).await;
                    monitor::check(Tier::External, &self.config.external_path).await;
                }
            }
        }
    }
}

/// Opt-in periodic retention sweep for long-running sessions.
async fn run_periodic_sweep(
    sweeper: RetentionSweeper,
    period: Duration,
    cancel: CancellationToken,
) {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match sweeper.sweep() {
                    Ok(summary) if summary.deleted > 0 => info!(
                        deleted = summary.deleted,
                        "periodic retention sweep complete"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!("periodic retention sweep failed: {e:#}"),
                }
            }
        }
    }
}
