//! Dual-channel script results.
//!
//! stdout is for token-cheap inspection; the named result artifact is for
//! exact, complete retrieval. A [`ScriptOutcome`] carries both: the trimmed
//! stdout digest, and a reference to the result artifact when the script
//! actually wrote one during this run.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::runner::{ExecutionResult, ScriptRunner};
use crate::text::{tail, truncate_in_place};

pub const SUCCESS_PREFIX: &str = "[OK]";
pub const FAILURE_PREFIX: &str = "[FAILED]";

/// Most stderr shown with a failed run. A traceback's last lines name the
/// failing key or attribute, which is what the caller needs to fix its code.
pub const STDERR_TAIL_BYTES: usize = 2_000;

/// Summary of one script run as seen by the reasoning loop.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptOutcome {
    /// Trimmed stdout.
    pub digest: String,
    /// Result artifact written (created or modified) by this run.
    pub artifact_ref: Option<PathBuf>,
    pub execution: ExecutionResult,
}

impl ScriptOutcome {
    pub fn from_execution(execution: ExecutionResult, artifact_ref: Option<PathBuf>) -> Self {
        Self {
            digest: execution.stdout.trim().to_string(),
            artifact_ref,
            execution,
        }
    }

    pub fn success(&self) -> bool {
        self.execution.success()
    }

    /// Status line, digest, artifact reference, truncation notice and (on
    /// failure) the stderr tail, fitted into roughly `max_bytes`. Only the
    /// digest is shortened to make room.
    pub fn render(&self, max_bytes: usize) -> String {
        let exec = &self.execution;
        let status = if self.success() {
            SUCCESS_PREFIX
        } else {
            FAILURE_PREFIX
        };
        let header = if exec.timed_out {
            format!(
                "{status} timed out after {} (exit {})",
                secs(exec.timeout),
                exec.exit_code
            )
        } else {
            format!("{status} exit {} in {}", exec.exit_code, secs(exec.elapsed))
        };

        let mut footer = String::new();
        if let Some(path) = &self.artifact_ref {
            footer.push_str(&format!("\nResult artifact: {}", path.display()));
        }
        if exec.truncated {
            footer.push_str(&format!(
                "\n[output truncated: captured {} of {} stdout bytes, {} of {} stderr bytes]",
                exec.stdout.len(),
                exec.stdout_bytes,
                exec.stderr.len(),
                exec.stderr_bytes
            ));
        }
        let stderr = exec.stderr.trim_end();
        if !self.success() && !stderr.is_empty() {
            let budget = STDERR_TAIL_BYTES.min(max_bytes / 2);
            let shown = tail(stderr, budget);
            if shown.len() < stderr.len() {
                footer.push_str(&format!("\nstderr (last {} bytes):\n{shown}", shown.len()));
            } else {
                footer.push_str(&format!("\nstderr:\n{shown}"));
            }
        }

        let mut out = header;
        if self.digest.is_empty() {
            if !self.success() || self.artifact_ref.is_none() {
                out.push_str("\n(no output)");
            }
        } else {
            let room = max_bytes.saturating_sub(out.len() + footer.len() + 1);
            let mut digest = self.digest.clone();
            if truncate_in_place(&mut digest, room) {
                digest.push_str(&format!(
                    "...\n[digest truncated: {} bytes total]",
                    self.digest.len()
                ));
            }
            out.push('\n');
            out.push_str(&digest);
        }
        out.push_str(&footer);
        out
    }
}

fn secs(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

/// Size and mtime of a file, used to detect whether a run touched it.
fn snapshot(path: &std::path::Path) -> Option<(SystemTime, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

impl ScriptRunner {
    /// Run `code` and pair its digest with the result artifact, if this run
    /// created or modified it.
    pub async fn run_summarized(&self, code: &str, timeout: Duration) -> Result<ScriptOutcome> {
        let path = self
            .session()
            .artifacts()
            .path_for(self.result_artifact())?;
        let before = snapshot(&path);

        let execution = self.run(code, timeout).await?;

        let after = snapshot(&path);
        let artifact_ref = match (before, after) {
            (_, None) => None,
            (Some(b), Some(a)) if a == b => {
                debug!("[exec] {} unchanged by this run", self.result_artifact());
                None
            }
            _ => Some(path),
        };
        Ok(ScriptOutcome::from_execution(execution, artifact_ref))
    }
}
