//! Command-line errors.

use adf_session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON from {origin}: {source}")]
    InvalidJson {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("skill '{name}' not found (available: {available})")]
    SkillNotFound { name: String, available: String },
}

impl CliError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Session(SessionError::NoActiveSession) => 2,
            CliError::Session(e) if e.is_not_found() => 3,
            CliError::SkillNotFound { .. } => 3,
            _ => 1,
        }
    }
}
