//! Error taxonomy for sessions, artifacts and script execution.
//!
//! Session- and store-level failures are raised to the immediate caller.
//! Script-level failures (bad code, exceptions inside the snippet) are not
//! errors at all: they come back as data in
//! [`ExecutionResult`](crate::runner::ExecutionResult) so the calling loop
//! can inspect the stderr and resubmit.

use std::time::Duration;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An artifact or script operation was attempted before a session was
    /// created (or after it was ended).
    #[error("no active session: create or open a session first")]
    NoActiveSession,

    /// The requested session directory does not exist.
    #[error("session '{id}' not found")]
    SessionNotFound { id: String },

    #[error("invalid artifact name '{name}': {reason}")]
    InvalidArtifactName { name: String, reason: &'static str },

    #[error("artifact '{name}' not found in session (use list_artifacts to see what exists)")]
    ArtifactNotFound { name: String },

    /// The artifact file exists but does not hold valid JSON.
    #[error("artifact '{name}' is corrupt: {source}")]
    ArtifactCorrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize artifact '{name}': {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A script exceeded its time limit. Only produced by
    /// [`ExecutionResult::into_completed`](crate::runner::ExecutionResult::into_completed);
    /// the runner itself reports timeouts as data.
    #[error("script timed out after {:.1}s", timeout.as_secs_f64())]
    ScriptTimeout { timeout: Duration },

    #[error("failed to start interpreter '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    /// Wrap an I/O error with a short description of what was attempted.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Shorthand for I/O failures on a specific path.
    pub(crate) fn io_at(action: &str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::io(format!("failed to {action} '{}'", path.display()), source)
    }

    /// Whether this is the "artifact does not exist" case.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ArtifactNotFound { .. } | Self::SessionNotFound { .. }
        )
    }
}

/// Error for a session whose directory vanished while a handle was in use.
pub(crate) fn session_gone(id: &str, dir: &std::path::Path) -> SessionError {
    tracing::warn!("Session directory {} no longer exists", dir.display());
    SessionError::SessionNotFound { id: id.to_string() }
}
