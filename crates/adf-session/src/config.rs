//! Runtime configuration for sessions and script execution.
//!
//! [`SessionConfig`] holds every tunable of the subsystem with sensible
//! defaults. Values can be overridden through builder methods or read from
//! the environment via [`SessionConfig::from_env`].
//!
//! # Examples
//!
//! ```ignore
//! let config = SessionConfig::from_env()
//!     .with_default_timeout(Duration::from_secs(30))
//!     .with_interpreter(Interpreter::shell());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::artifact::artifact_file_name;
use crate::runner::Interpreter;

/// Default cap on captured stdout/stderr per script run (each stream).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 256 * 1024;

/// Default hard timeout for a script run.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Conventional name of the artifact a script writes its definitive result to.
pub const DEFAULT_RESULT_ARTIFACT: &str = "results.json";

/// Maximum size of a single tool observation returned to the reasoning loop.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

pub const ENV_SESSIONS_DIR: &str = "ADF_SESSIONS_DIR";
pub const ENV_MAX_OUTPUT_BYTES: &str = "ADF_EXEC_MAX_OUTPUT_BYTES";
pub const ENV_EXEC_TIMEOUT_SECS: &str = "ADF_EXEC_TIMEOUT_SECS";
pub const ENV_INTERPRETER: &str = "ADF_EXEC_INTERPRETER";
pub const ENV_RESULT_ARTIFACT: &str = "ADF_RESULT_ARTIFACT";
pub const ENV_MAX_RESULT_BYTES: &str = "ADF_TOOL_MAX_RESULT_BYTES";

/// Configuration shared by the session manager, script runner and tools.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory under which one subdirectory per session is created.
    /// Default: `$TMPDIR/adf_agent/sessions`.
    pub sessions_root: PathBuf,
    /// Cap on captured bytes per output stream. Default: 256 KiB.
    pub max_output_bytes: usize,
    /// Timeout used when a caller does not pass one. Default: 60s.
    pub default_timeout: Duration,
    /// Program that executes submitted code. Default: Python.
    pub interpreter: Interpreter,
    /// Artifact name scripts write their final result to.
    pub result_artifact: String,
    /// Cap on a single tool observation. Default: 30 000 bytes.
    pub max_result_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sessions_root: default_sessions_root(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            default_timeout: DEFAULT_EXEC_TIMEOUT,
            interpreter: Interpreter::python(),
            result_artifact: DEFAULT_RESULT_ARTIFACT.to_string(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by any `ADF_*` environment variables that are set.
    pub fn from_env() -> Self {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Split out from [`from_env`](Self::from_env)
    /// so tests don't have to mutate the process environment.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_SESSIONS_DIR).filter(|v| !v.trim().is_empty()) {
            self.sessions_root = PathBuf::from(dir);
        }
        if let Some(bytes) = parse_env(&lookup, ENV_MAX_OUTPUT_BYTES) {
            self.max_output_bytes = bytes;
        }
        if let Some(secs) = parse_env::<u64>(&lookup, ENV_EXEC_TIMEOUT_SECS) {
            self.default_timeout = Duration::from_secs(secs);
        }
        if let Some(spec) = lookup(ENV_INTERPRETER).filter(|v| !v.trim().is_empty()) {
            match Interpreter::parse(&spec) {
                Some(interp) => self.interpreter = interp,
                None => warn!("Ignoring {ENV_INTERPRETER}={spec:?}: empty command"),
            }
        }
        if let Some(name) = lookup(ENV_RESULT_ARTIFACT).filter(|v| !v.trim().is_empty()) {
            match artifact_file_name(&name) {
                Ok(_) => self.result_artifact = name,
                Err(e) => warn!("Ignoring {ENV_RESULT_ARTIFACT}={name:?}: {e}"),
            }
        }
        if let Some(bytes) = parse_env(&lookup, ENV_MAX_RESULT_BYTES) {
            self.max_result_bytes = bytes;
        }
        self
    }

    pub fn with_sessions_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sessions_root = root.into();
        self
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_result_artifact(mut self, name: impl Into<String>) -> Self {
        self.result_artifact = name.into();
        self
    }

    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }
}

/// `$TMPDIR/adf_agent/sessions`.
pub fn default_sessions_root() -> PathBuf {
    std::env::temp_dir().join("adf_agent").join("sessions")
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_output_bytes, 262_144);
        assert_eq!(config.default_timeout, Duration::from_secs(60));
        assert_eq!(config.result_artifact, "results.json");
        assert_eq!(config.max_result_bytes, 30_000);
        assert_eq!(config.interpreter, Interpreter::python());
        assert!(config.sessions_root.ends_with("adf_agent/sessions"));
    }

    #[test]
    fn env_overrides_apply() {
        let config = SessionConfig::default().apply_env(lookup_from(&[
            (ENV_SESSIONS_DIR, "/srv/adf"),
            (ENV_MAX_OUTPUT_BYTES, "1024"),
            (ENV_EXEC_TIMEOUT_SECS, "5"),
            (ENV_INTERPRETER, "shell"),
            (ENV_RESULT_ARTIFACT, "answer.json"),
            (ENV_MAX_RESULT_BYTES, "2000"),
        ]));
        assert_eq!(config.sessions_root, PathBuf::from("/srv/adf"));
        assert_eq!(config.max_output_bytes, 1024);
        assert_eq!(config.default_timeout, Duration::from_secs(5));
        assert_eq!(config.interpreter, Interpreter::shell());
        assert_eq!(config.result_artifact, "answer.json");
        assert_eq!(config.max_result_bytes, 2000);
    }

    #[test]
    fn invalid_numbers_are_ignored() {
        let config = SessionConfig::default().apply_env(lookup_from(&[
            (ENV_MAX_OUTPUT_BYTES, "lots"),
            (ENV_EXEC_TIMEOUT_SECS, "-3"),
        ]));
        assert_eq!(config.max_output_bytes, DEFAULT_MAX_OUTPUT_BYTES);
        assert_eq!(config.default_timeout, DEFAULT_EXEC_TIMEOUT);
    }

    #[test]
    fn invalid_result_artifact_is_ignored() {
        for bad in ["../x", "a/b.json", ".hidden"] {
            let config =
                SessionConfig::default().apply_env(lookup_from(&[(ENV_RESULT_ARTIFACT, bad)]));
            assert_eq!(config.result_artifact, DEFAULT_RESULT_ARTIFACT, "accepted {bad:?}");
        }
    }

    #[test]
    fn builders_override_fields() {
        let config = SessionConfig::default()
            .with_sessions_root("/tmp/x")
            .with_max_output_bytes(10)
            .with_default_timeout(Duration::from_millis(250))
            .with_result_artifact("out.json");
        assert_eq!(config.sessions_root, PathBuf::from("/tmp/x"));
        assert_eq!(config.max_output_bytes, 10);
        assert_eq!(config.default_timeout, Duration::from_millis(250));
        assert_eq!(config.result_artifact, "out.json");
    }
}
