//! E2E regression suite for kiroku
//!
//! Exercises the full record → transfer → shutdown-flush pipeline with the
//! synthetic capture backend (no camera hardware), plus the launch-failure
//! and crash paths through the orchestrator.
//!
//! Run: `cargo test -p kiroku --test e2e`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use kiroku::{
    chunk, ActiveChunkHandle, BackendExit, CaptureBackend, CaptureConfig, ProcessBackend,
    Recorder, RecorderConfig, SessionError, TestSourceBackend,
};

// ── Shared helpers ───────────────────────────────────────────────────

/// Config with tiny intervals so a session fits in a few seconds.
fn fast_config(local: &Path, external: &Path) -> RecorderConfig {
    RecorderConfig {
        local_path: local.to_path_buf(),
        external_path: external.to_path_buf(),
        chunk_duration: Duration::from_millis(150),
        transfer_interval: Duration::from_millis(400),
        liveness_poll: Duration::from_millis(100),
        stop_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn chunk_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(chunk::is_chunk_name)
                })
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

/// Backend that produces two completed chunks at start, then exits after a
/// few liveness polls: a mid-session crash with work left to flush.
struct CrashingSource {
    polls_until_exit: u32,
    active: ActiveChunkHandle,
}

#[async_trait]
impl CaptureBackend for CrashingSource {
    async fn start(&mut self, config: &CaptureConfig) -> Result<()> {
        for index in 0..2 {
            let path = chunk::chunk_path(&config.output_dir, "20250807_120000", index);
            tokio::fs::write(&path, vec![0u8; 1024]).await?;
        }
        Ok(())
    }

    fn try_wait(&mut self) -> Result<Option<BackendExit>> {
        if self.polls_until_exit == 0 {
            return Ok(Some(BackendExit {
                status: "signal: 11".to_string(),
                stdout: String::new(),
                stderr: "segfault in encoder".to_string(),
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

// ═══════════════════════════════════════════════════════════════════════
// Launch failure
// ═══════════════════════════════════════════════════════════════════════

/// A backend that exits immediately after spawn ends the session with a
/// launch error, produces zero chunks, and the final flush is a no-op.
#[tokio::test(flavor = "multi_thread")]
async fn immediate_backend_exit_fails_launch() {
    let local = tempdir().unwrap();
    let external = tempdir().unwrap();

    // `false` spawns fine and exits non-zero right away, the same shape
    // as a camera held by another process.
    let backend = ProcessBackend::with_program("false");
    let recorder = Recorder::new(
        fast_config(local.path(), external.path()),
        Box::new(backend),
    )
    .unwrap();

    let err = recorder.run(CancellationToken::new()).await.unwrap_err();
    match err.downcast_ref::<SessionError>() {
        Some(SessionError::BackendLaunch { .. }) => {}
        other => panic!("expected BackendLaunch, got {other:?}"),
    }

    assert!(chunk_files(local.path()).is_empty());
    assert!(chunk_files(external.path()).is_empty());
}

/// A backend binary that cannot be spawned at all is also a launch error.
#[tokio::test(flavor = "multi_thread")]
async fn unspawnable_backend_fails_launch() {
    let local = tempdir().unwrap();
    let external = tempdir().unwrap();

    let backend = ProcessBackend::with_program("definitely-not-a-camera");
    let recorder = Recorder::new(
        fast_config(local.path(), external.path()),
        Box::new(backend),
    )
    .unwrap();

    let err = recorder.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::BackendLaunch { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════
// Full pipeline
// ═══════════════════════════════════════════════════════════════════════

/// Chunks recorded by the test source end up verified on the external
/// tier; the shutdown flush strands nothing on the local tier.
#[tokio::test(flavor = "multi_thread")]
async fn session_moves_every_completed_chunk() {
    let local = tempdir().unwrap();
    let external = tempdir().unwrap();

    let recorder = Recorder::new(
        fast_config(local.path(), external.path()),
        Box::new(TestSourceBackend::new()),
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let session_cancel = cancel.clone();
    let session = tokio::spawn(async move { recorder.run(session_cancel).await });

    // Background cycles move completed chunks while recording continues.
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(
        !chunk_files(external.path()).is_empty(),
        "background transfer cycle should have moved completed chunks"
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    session.await.unwrap().unwrap();

    // Nothing stranded locally; everything verified on the external tier.
    assert!(
        chunk_files(local.path()).is_empty(),
        "local tier should be empty after the shutdown flush"
    );
    let moved = chunk_files(external.path());
    assert!(moved.len() >= 2, "expected several chunks, got {moved:?}");
    for path in &moved {
        assert_eq!(
            std::fs::metadata(path).unwrap().len(),
            32 * 1024,
            "chunk {} has the wrong size",
            path.display()
        );
    }
}

/// A crash mid-session surfaces as BackendCrash, and only after the
/// shutdown sequence has flushed all completed chunks to the external tier.
#[tokio::test(flavor = "multi_thread")]
async fn crash_still_flushes_completed_chunks() {
    let local = tempdir().unwrap();
    let external = tempdir().unwrap();

    let backend = CrashingSource {
        polls_until_exit: 3,
        active: ActiveChunkHandle::default(),
    };
    let recorder = Recorder::new(
        fast_config(local.path(), external.path()),
        Box::new(backend),
    )
    .unwrap();

    let err = recorder.run(CancellationToken::new()).await.unwrap_err();
    match err.downcast_ref::<SessionError>() {
        Some(SessionError::BackendCrash { status, diagnostics }) => {
            assert!(status.contains("signal"));
            assert!(diagnostics.contains("segfault"));
        }
        other => panic!("expected BackendCrash, got {other:?}"),
    }

    assert!(chunk_files(local.path()).is_empty());
    assert_eq!(chunk_files(external.path()).len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════
// Shutdown interactions
// ═══════════════════════════════════════════════════════════════════════

/// Cancelling before the first transfer interval still relocates every
/// chunk: the flush is not tied to the worker's schedule.
#[tokio::test(flavor = "multi_thread")]
async fn early_shutdown_flushes_without_a_cycle() {
    let local = tempdir().unwrap();
    let external = tempdir().unwrap();

    let mut config = fast_config(local.path(), external.path());
    // Interval far beyond the session length: the worker never ticks.
    config.transfer_interval = Duration::from_secs(3600);

    let recorder = Recorder::new(config, Box::new(TestSourceBackend::new())).unwrap();

    let cancel = CancellationToken::new();
    let session_cancel = cancel.clone();
    let session = tokio::spawn(async move { recorder.run(session_cancel).await });

    tokio::time::sleep(Duration::from_millis(600)).await;
    cancel.cancel();
    session.await.unwrap().unwrap();

    assert!(chunk_files(local.path()).is_empty());
    assert!(!chunk_files(external.path()).is_empty());
}
