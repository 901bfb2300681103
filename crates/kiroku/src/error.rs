//! Session-level error taxonomy
//!
//! Per-file transfer and retention errors are contained and retried where
//! they occur; only backend failures are fatal to a session and propagate
//! up to the orchestrator, which still runs the final flush before exiting.

use thiserror::Error;

/// Fatal errors for a recording session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The capture backend could not be started, or exited immediately
    /// after launch (e.g. the camera is held by another process).
    #[error("capture backend failed to launch: {reason}")]
    BackendLaunch {
        reason: String,
        /// Captured stdout/stderr of the failed launch, for diagnosis.
        diagnostics: String,
    },

    /// The capture backend exited unexpectedly mid-session.
    #[error("capture backend exited unexpectedly ({status})")]
    BackendCrash {
        status: String,
        diagnostics: String,
    },
}

impl SessionError {
    /// Captured backend output associated with this failure.
    pub fn diagnostics(&self) -> &str {
        match self {
            SessionError::BackendLaunch { diagnostics, .. } => diagnostics,
            SessionError::BackendCrash { diagnostics, .. } => diagnostics,
        }
    }
}
