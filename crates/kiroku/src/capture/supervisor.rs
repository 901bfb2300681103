//! Capture supervisor
//!
//! Owns the capture backend's lifecycle: start with immediate-exit
//! detection, periodic liveness polling, graceful-then-forced stop. The
//! supervisor is the sole owner of the `Recording → Completed` transition;
//! everything downstream observes it through the active-chunk handle.

use anyhow::Result;
use std::time::Duration;
use tracing::{error, info};

use super::{ActiveChunkHandle, CaptureBackend, CaptureConfig};
use crate::error::SessionError;

/// Window after a successful spawn in which an exit is treated as a
/// launch failure rather than a crash (e.g. camera held by another
/// process, which surfaces as an immediate non-zero exit).
const LAUNCH_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Supervises one capture backend for one recording session.
pub struct CaptureSupervisor {
    backend: Box<dyn CaptureBackend>,
    state: SupervisorState,
}

impl CaptureSupervisor {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            state: SupervisorState::Idle,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Handle to the chunk currently being written, shared with the
    /// transfer worker.
    pub fn active_handle(&self) -> ActiveChunkHandle {
        self.backend.active_handle()
    }

    /// Launch the backend and verify it survives the launch window.
    pub async fn start(&mut self, config: &CaptureConfig) -> Result<(), SessionError> {
        self.state = SupervisorState::Starting;

        if let Err(e) = self.backend.start(config).await {
            self.state = SupervisorState::Stopped;
            return Err(SessionError::BackendLaunch {
                reason: format!("{e:#}"),
                diagnostics: String::new(),
            });
        }

        // An immediate exit means the session never really started.
        tokio::time::sleep(LAUNCH_GRACE).await;
        match self.backend.try_wait() {
            Ok(Some(exit)) => {
                self.state = SupervisorState::Stopped;
                Err(SessionError::BackendLaunch {
                    reason: format!("backend exited during startup ({})", exit.status),
                    diagnostics: exit.diagnostics(),
                })
            }
            Err(e) => {
                self.state = SupervisorState::Stopped;
                Err(SessionError::BackendLaunch {
                    reason: format!("could not poll backend after launch: {e:#}"),
                    diagnostics: String::new(),
                })
            }
            Ok(None) => {
                self.state = SupervisorState::Running;
                info!("capture backend running");
                Ok(())
            }
        }
    }

    /// Non-blocking liveness check, called on a fixed interval from the
    /// main loop. An unexpected exit transitions to `Stopped` and surfaces
    /// the backend's captured output.
    pub fn poll_liveness(&mut self) -> Result<(), SessionError> {
        if self.state != SupervisorState::Running {
            return Ok(());
        }
        match self.backend.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(exit)) => {
                self.state = SupervisorState::Stopped;
                error!(status = %exit.status, "capture backend exited unexpectedly");
                Err(SessionError::BackendCrash {
                    status: exit.status.clone(),
                    diagnostics: exit.diagnostics(),
                })
            }
            Err(e) => {
                self.state = SupervisorState::Stopped;
                Err(SessionError::BackendCrash {
                    status: format!("liveness poll failed: {e:#}"),
                    diagnostics: String::new(),
                })
            }
        }
    }

    /// Stop the backend: graceful up to `timeout`, forced after. Safe to
    /// call in any state. The orchestrator runs the final transfer flush
    /// immediately after this returns.
    pub async fn stop(&mut self, timeout: Duration) -> Result<()> {
        match self.state {
            SupervisorState::Idle | SupervisorState::Stopped => return Ok(()),
            _ => {}
        }
        self.state = SupervisorState::Stopping;
        info!("stopping capture backend");
        let result = self.backend.stop(timeout).await;
        self.state = SupervisorState::Stopped;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{BackendExit, TestSourceBackend};
    use async_trait::async_trait;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> CaptureConfig {
        CaptureConfig {
            output_dir: dir.to_path_buf(),
            chunk_duration: Duration::from_millis(100),
            width: 640,
            height: 480,
            bitrate: 1_000_000,
            framerate: 30,
            preview: false,
        }
    }

    /// Backend that starts fine, then exits after a configured number of
    /// liveness polls.
    struct FlakyBackend {
        polls_until_exit: u32,
        active: ActiveChunkHandle,
    }

    #[async_trait]
    impl CaptureBackend for FlakyBackend {
        async fn start(&mut self, _config: &CaptureConfig) -> Result<()> {
            Ok(())
        }

        fn try_wait(&mut self) -> Result<Option<BackendExit>> {
            if self.polls_until_exit == 0 {
                return Ok(Some(BackendExit {
                    status: "exit status: 1".to_string(),
                    stdout: String::new(),
                    stderr: "failed to acquire camera".to_string(),
                }));
            }
            self.polls_until_exit -= 1;
            Ok(None)
        }

        fn active_handle(&self) -> ActiveChunkHandle {
            self.active.clone()
        }

        async fn stop(&mut self, _timeout: Duration) -> Result<()> {
            self.active.clear();
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_with_test_source() {
        let dir = tempdir().unwrap();
        let mut supervisor = CaptureSupervisor::new(Box::new(TestSourceBackend::new()));
        assert_eq!(supervisor.state(), SupervisorState::Idle);

        supervisor.start(&test_config(dir.path())).await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Running);
        assert!(supervisor.active_handle().current().is_some());

        supervisor.poll_liveness().unwrap();

        supervisor.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert_eq!(supervisor.active_handle().current(), None);

        // Stopping again is a no-op.
        supervisor.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn immediate_exit_is_a_launch_failure() {
        let dir = tempdir().unwrap();
        let backend = FlakyBackend {
            polls_until_exit: 0,
            active: ActiveChunkHandle::default(),
        };
        let mut supervisor = CaptureSupervisor::new(Box::new(backend));

        let err = supervisor.start(&test_config(dir.path())).await.unwrap_err();
        match err {
            SessionError::BackendLaunch { diagnostics, .. } => {
                assert!(diagnostics.contains("failed to acquire camera"));
            }
            other => panic!("expected BackendLaunch, got {other:?}"),
        }
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mid_session_exit_is_a_crash() {
        let dir = tempdir().unwrap();
        let backend = FlakyBackend {
            polls_until_exit: 2,
            active: ActiveChunkHandle::default(),
        };
        let mut supervisor = CaptureSupervisor::new(Box::new(backend));
        supervisor.start(&test_config(dir.path())).await.unwrap();

        // First post-launch poll is fine, the next sees the exit.
        supervisor.poll_liveness().unwrap();
        let err = supervisor.poll_liveness().unwrap_err();
        assert!(matches!(err, SessionError::BackendCrash { .. }));
        assert_eq!(supervisor.state(), SupervisorState::Stopped);

        // Once stopped, polling is a no-op.
        supervisor.poll_liveness().unwrap();
    }
}
