//! External process lifecycle
//!
//! Wraps a child process in its own process group so helper children exit
//! with it, polls liveness without blocking, and implements
//! graceful-then-forced termination. Platform signal semantics live here
//! so the rest of the crate stays platform-agnostic.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout};
use tracing::{debug, warn};

/// Tail bytes of stdout/stderr kept per stream for diagnostics.
const OUTPUT_TAIL_BYTES: usize = 16 * 1024;

/// Shared tail buffer filled by a background reader task.
#[derive(Clone, Default)]
struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    fn append(&self, data: &[u8]) {
        let mut buf = self.0.lock().unwrap();
        buf.extend_from_slice(data);
        let len = buf.len();
        if len > OUTPUT_TAIL_BYTES {
            buf.drain(..len - OUTPUT_TAIL_BYTES);
        }
    }

    fn snapshot(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Handle to a child process running in its own process group.
pub struct ProcessHandle {
    child: Child,
    pgid: i32,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
}

impl ProcessHandle {
    /// Spawn `program` with `args`, capturing stdout/stderr.
    pub fn spawn(program: &str, args: &[String], current_dir: Option<&Path>) -> Result<Self> {
        let mut cmd = std::process::Command::new(program);
        cmd.args(args);
        if let Some(dir) = current_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // New process group: a group-wide signal reaches helper children.
            cmd.process_group(0);
        }

        let mut cmd = tokio::process::Command::from(cmd);
        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn '{program}'"))?;

        let pgid = child.id().map(|id| id as i32).unwrap_or(0);
        let stdout = OutputBuffer::default();
        let stderr = OutputBuffer::default();

        if let Some(out) = child.stdout.take() {
            spawn_stdout_reader(out, stdout.clone());
        }
        if let Some(err) = child.stderr.take() {
            spawn_stderr_reader(err, stderr.clone());
        }

        debug!(program, pid = pgid, "spawned child process");
        Ok(Self {
            child,
            pgid,
            stdout,
            stderr,
        })
    }

    /// Non-blocking liveness check. `Ok(None)` while the process runs.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().context("failed to poll child process")
    }

    /// Request a graceful stop: signal the process group, wait up to
    /// `timeout`, then force-kill the group.
    pub async fn request_stop(&mut self, timeout: Duration) -> Result<ExitStatus> {
        if let Some(status) = self.try_wait()? {
            return Ok(status);
        }

        self.signal_group(Signal::Term);
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => status.context("failed to reap child process"),
            Err(_) => {
                warn!(
                    pid = self.pgid,
                    "child did not stop within {:?}, killing process group", timeout
                );
                self.signal_group(Signal::Kill);
                let _ = self.child.start_kill();
                self.child.wait().await.context("failed to reap killed child")
            }
        }
    }

    /// Captured stdout and stderr tails (so far).
    pub fn output(&self) -> (String, String) {
        (self.stdout.snapshot(), self.stderr.snapshot())
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: Signal) {
        let sig = match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        if self.pgid > 0 {
            // ESRCH just means the group is already gone.
            unsafe {
                libc::killpg(self.pgid, sig);
            }
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&self, _signal: Signal) {}
}

#[derive(Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

fn spawn_stdout_reader(mut out: ChildStdout, buf: OutputBuffer) {
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match out.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.append(&chunk[..n]),
            }
        }
    });
}

fn spawn_stderr_reader(mut err: ChildStderr, buf: OutputBuffer) {
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match err.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.append(&chunk[..n]),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn spawn_failure_for_missing_program() {
        let result = ProcessHandle::spawn("definitely-not-a-real-binary", &[], None);
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn short_lived_child_is_reaped() {
        let mut handle =
            ProcessHandle::spawn("sh", &["-c".into(), "echo out; echo err >&2".into()], None)
                .unwrap();

        // Wait for exit without blocking the poll interface.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let status = loop {
            if let Some(status) = handle.try_wait().unwrap() {
                break status;
            }
            assert!(tokio::time::Instant::now() < deadline, "child never exited");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert!(status.success());

        // Reader tasks need a beat to drain the pipes.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let (stdout, stderr) = handle.output();
        assert!(stdout.contains("out"));
        assert!(stderr.contains("err"));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn graceful_stop_terminates_long_runner() {
        let mut handle =
            ProcessHandle::spawn("sh", &["-c".into(), "sleep 30".into()], None).unwrap();
        assert!(handle.try_wait().unwrap().is_none());

        let status = handle.request_stop(Duration::from_secs(5)).await.unwrap();
        // Terminated by signal, not a normal exit.
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn stubborn_child_is_killed_after_timeout() {
        // The shell traps SIGTERM and respawns its sleeps, so only the
        // SIGKILL escalation can end it.
        let mut handle = ProcessHandle::spawn(
            "sh",
            &[
                "-c".into(),
                "trap '' TERM; while true; do sleep 1; done".into(),
            ],
            None,
        )
        .unwrap();

        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = handle.request_stop(Duration::from_millis(300)).await.unwrap();
        assert!(!status.success());
    }
}
