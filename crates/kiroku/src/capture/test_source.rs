//! Synthetic capture backend
//!
//! Writes a small placeholder chunk per segment interval, tracking its own
//! segment index. Lets the full record/transfer/retention pipeline run on
//! development machines and in the e2e suite without camera hardware.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ActiveChunkHandle, BackendExit, CaptureBackend, CaptureConfig};
use crate::chunk;

/// Bytes written per synthetic chunk.
const PAYLOAD_BYTES: usize = 32 * 1024;

/// In-process capture backend producing placeholder chunks.
pub struct TestSourceBackend {
    active: ActiveChunkHandle,
    running: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl TestSourceBackend {
    pub fn new() -> Self {
        Self {
            active: ActiveChunkHandle::default(),
            running: None,
        }
    }
}

impl Default for TestSourceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for TestSourceBackend {
    async fn start(&mut self, config: &CaptureConfig) -> Result<()> {
        let stamp = chunk::session_stamp(Local::now());
        let dir = config.output_dir.clone();
        let segment = config.chunk_duration;
        let active = self.active.clone();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        debug!(dir = %dir.display(), ?segment, "starting test source");
        let task = tokio::spawn(async move {
            let payload = vec![0u8; PAYLOAD_BYTES];
            let mut index = 0u32;
            loop {
                let path = chunk::chunk_path(&dir, &stamp, index);
                // Publish the handle before the file exists: the chunk is
                // in Recording state for the whole segment interval.
                active.set_path(path.clone());
                if let Err(e) = tokio::fs::write(&path, &payload).await {
                    warn!(file = %path.display(), "test source write failed: {e}");
                    break;
                }
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = tokio::time::sleep(segment) => {}
                }
                index += 1;
            }
        });

        self.running = Some(Running { cancel, task });
        Ok(())
    }

    fn try_wait(&mut self) -> Result<Option<BackendExit>> {
        let Some(running) = self.running.as_ref() else {
            return Ok(None);
        };
        if running.task.is_finished() && !running.cancel.is_cancelled() {
            self.running = None;
            self.active.clear();
            return Ok(Some(BackendExit {
                status: "test source ended".to_string(),
                stdout: String::new(),
                stderr: String::new(),
            }));
        }
        Ok(None)
    }

    fn active_handle(&self) -> ActiveChunkHandle {
        self.active.clone()
    }

    async fn stop(&mut self, _timeout: Duration) -> Result<()> {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            let _ = running.task.await;
        }
        self.active.clear();
        Ok(())
    }
}
