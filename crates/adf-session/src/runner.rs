//! Isolated subprocess execution of analysis code.
//!
//! A [`ScriptRunner`] executes one snippet per call in a fresh interpreter
//! process whose working directory is the session directory. The only state
//! shared with the caller is the filesystem: the script reads artifacts the
//! caller staged, prints a digest to stdout and writes complete results back
//! as artifacts.
//!
//! Both output streams are captured up to a byte cap. On Unix the child
//! leads its own process group; a hard timeout kills the whole group and
//! reaps the child, and the timed-out result is returned with whatever
//! output arrived before the kill.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::session::SessionHandle;
use crate::text::truncate_in_place;

/// Exit code reported for a script killed by the timeout (as coreutils
/// `timeout(1)` does).
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Environment variable holding the absolute session directory.
pub const SESSION_DIR_ENV: &str = "SESSION_DIR";

/// Environment variable naming the conventional result artifact.
pub const RESULT_ARTIFACT_ENV: &str = "RESULT_ARTIFACT";

const PYTHON_PRELUDE: &str = include_str!("runtime/prelude.py");

/// How long reader tasks may keep draining after the child has exited.
const READER_GRACE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8 * 1024;

// ── Interpreter ────────────────────────────────────────────────────

/// Program that executes submitted code, read from stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: String,
    pub args: Vec<String>,
    /// Source prepended to every snippet.
    pub prelude: Option<String>,
    /// Extra environment for the child.
    pub env: Vec<(String, String)>,
}

impl Interpreter {
    /// `python3 -u -` with the runtime helpers (`load_json`, `save_json`,
    /// `save_result`, `pretty_print`, ...) preloaded.
    pub fn python() -> Self {
        let program = if cfg!(windows) { "python" } else { "python3" };
        Self {
            program: program.to_string(),
            args: vec!["-u".into(), "-".into()],
            prelude: Some(PYTHON_PRELUDE.to_string()),
            env: vec![
                ("PYTHONIOENCODING".into(), "utf-8".into()),
                ("PYTHONDONTWRITEBYTECODE".into(), "1".into()),
            ],
        }
    }

    /// POSIX `sh -s`, no prelude.
    pub fn shell() -> Self {
        Self::command("sh", ["-s"])
    }

    /// Arbitrary program reading the script from stdin.
    pub fn command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            prelude: None,
            env: Vec::new(),
        }
    }

    /// Parse `python`, `shell`, or a whitespace-separated command line.
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.trim() {
            "python" | "python3" => Some(Self::python()),
            "shell" | "sh" => Some(Self::shell()),
            other => {
                let mut parts = other.split_whitespace();
                let program = parts.next()?;
                Some(Self::command(program, parts))
            }
        }
    }

    pub fn with_prelude(mut self, prelude: impl Into<String>) -> Self {
        self.prelude = Some(prelude.into());
        self
    }

    /// Full source fed to the interpreter: prelude, then the snippet.
    ///
    /// Tracebacks report line numbers relative to this text, so they are
    /// offset by [`prelude_lines`](Self::prelude_lines).
    pub fn script_source(&self, code: &str) -> String {
        let mut source = String::with_capacity(
            code.len() + self.prelude.as_ref().map_or(0, String::len) + 2,
        );
        if let Some(prelude) = &self.prelude {
            source.push_str(prelude);
            if !prelude.ends_with('\n') {
                source.push('\n');
            }
        }
        source.push_str(code);
        if !code.ends_with('\n') {
            source.push('\n');
        }
        source
    }

    /// Number of lines the prelude adds in front of the snippet.
    pub fn prelude_lines(&self) -> usize {
        self.prelude.as_deref().map_or(0, |p| p.lines().count())
    }
}

// ── ExecutionResult ────────────────────────────────────────────────

/// Captured outcome of one subprocess run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; `128 + signal` for signal deaths on Unix,
    /// [`TIMEOUT_EXIT_CODE`] on timeout.
    pub exit_code: i32,
    /// Output was dropped from either stream.
    pub truncated: bool,
    pub timed_out: bool,
    /// Bytes the script wrote to each stream, including discarded ones.
    pub stdout_bytes: usize,
    pub stderr_bytes: usize,
    pub elapsed: Duration,
    /// Timeout the run was started with.
    pub timeout: Duration,
    pub pid: Option<u32>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Turn a timed-out run into [`SessionError::ScriptTimeout`]; every
    /// other result (including non-zero exits) passes through.
    pub fn into_completed(self) -> Result<Self> {
        if self.timed_out {
            Err(SessionError::ScriptTimeout {
                timeout: self.timeout,
            })
        } else {
            Ok(self)
        }
    }
}

// ── Output capture ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Capture {
    data: Vec<u8>,
    total: usize,
}

type SharedCapture = Arc<Mutex<Capture>>;

/// Read `reader` to EOF, keeping at most `cap` bytes. Bytes past the cap are
/// still read so the child never blocks on a full pipe.
async fn drain_into<R: AsyncRead + Unpin>(mut reader: R, sink: SharedCapture, cap: usize) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let Ok(mut capture) = sink.lock() else { break };
                capture.total += n;
                let room = cap.saturating_sub(capture.data.len()).min(n);
                capture.data.extend_from_slice(&buf[..room]);
            }
            Err(e) => {
                debug!("[exec] output stream closed with error: {e}");
                break;
            }
        }
    }
}

/// Decoded capture, cut to `cap` on a char boundary.
struct Captured {
    text: String,
    total: usize,
    /// Bytes were dropped: past the cap, or cut after lossy decoding.
    truncated: bool,
}

fn take_capture(sink: &SharedCapture, cap: usize) -> Captured {
    let Ok(mut capture) = sink.lock() else {
        return Captured {
            text: String::new(),
            total: 0,
            truncated: false,
        };
    };
    let data = std::mem::take(&mut capture.data);
    let mut text = String::from_utf8_lossy(&data).into_owned();
    // Each invalid byte decodes to a 3-byte U+FFFD, so the text can overshoot.
    let cut = truncate_in_place(&mut text, cap);
    Captured {
        text,
        total: capture.total,
        truncated: cut || capture.total > cap,
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!("[exec] process group {pgid} already gone");
        } else {
            warn!("[exec] failed to kill process group {pgid}: {err}");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

// ── ScriptRunner ───────────────────────────────────────────────────

/// Executes code snippets inside one session directory.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    session: SessionHandle,
    interpreter: Interpreter,
    max_output_bytes: usize,
    default_timeout: Duration,
    result_artifact: String,
}

impl ScriptRunner {
    pub fn new(session: SessionHandle, config: &SessionConfig) -> Self {
        Self {
            session,
            interpreter: config.interpreter.clone(),
            max_output_bytes: config.max_output_bytes,
            default_timeout: config.default_timeout,
            result_artifact: config.result_artifact.clone(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Artifact name scripts are told (via `RESULT_ARTIFACT`) to write to.
    pub fn result_artifact(&self) -> &str {
        &self.result_artifact
    }

    /// Run with the configured default timeout.
    pub async fn run_default(&self, code: &str) -> Result<ExecutionResult> {
        self.run(code, self.default_timeout).await
    }

    /// Execute `code` in a fresh interpreter process and wait for it to
    /// exit or be killed.
    ///
    /// Non-zero exits and timeouts are reported in the result. Errors are
    /// reserved for a missing session directory or an interpreter that
    /// cannot be started.
    pub async fn run(&self, code: &str, timeout: Duration) -> Result<ExecutionResult> {
        self.session.ensure_live()?;
        let dir = self.session.dir();
        let interp = &self.interpreter;
        let cap = self.max_output_bytes;

        info!(
            "[exec] session {}: running {} bytes with {} (timeout {:.1}s)",
            self.session.id(),
            code.len(),
            interp.program,
            timeout.as_secs_f64()
        );

        let mut cmd = Command::new(&interp.program);
        cmd.args(&interp.args)
            .current_dir(dir)
            .env(SESSION_DIR_ENV, dir)
            .env(RESULT_ARTIFACT_ENV, &self.result_artifact)
            .envs(interp.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| SessionError::Spawn {
            program: interp.program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!("[exec] spawned pid {pid:?}");

        let stdout_capture = SharedCapture::default();
        let stderr_capture = SharedCapture::default();
        let mut stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(drain_into(out, stdout_capture.clone(), cap)));
        let mut stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(drain_into(err, stderr_capture.clone(), cap)));

        // Dropping stdin after the write sends EOF.
        let writer = child.stdin.take().map(|mut stdin| {
            let source = interp.script_source(code);
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(source.as_bytes()).await {
                    debug!("[exec] script stdin closed early: {e}");
                }
            })
        });

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (exit_code_of(status), false),
            Ok(Err(e)) => {
                kill_process_group(pid);
                if let Err(kill_err) = child.start_kill() {
                    warn!("[exec] failed to kill pid {pid:?}: {kill_err}");
                }
                return Err(SessionError::io("failed to wait for script process", e));
            }
            Err(_) => {
                warn!(
                    "[exec] pid {pid:?} exceeded {:.1}s timeout, killing",
                    timeout.as_secs_f64()
                );
                // Group first, while the leader is unreaped and the pgid is ours.
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!("[exec] failed to kill pid {pid:?}: {e}");
                }
                (TIMEOUT_EXIT_CODE, true)
            }
        };

        if let Some(writer) = writer {
            writer.abort();
        }

        // Streams normally hit EOF as soon as the child exits. A background
        // grandchild may still hold them open; stop waiting after the grace.
        let drained = tokio::time::timeout(READER_GRACE, async {
            if let Some(task) = stdout_task.as_mut() {
                let _ = task.await;
            }
            if let Some(task) = stderr_task.as_mut() {
                let _ = task.await;
            }
        })
        .await;
        if drained.is_err() {
            debug!("[exec] output still open after exit, killing leftovers");
            kill_process_group(pid);
            stdout_task.iter().for_each(|t| t.abort());
            stderr_task.iter().for_each(|t| t.abort());
        }

        let out = take_capture(&stdout_capture, cap);
        let err = take_capture(&stderr_capture, cap);
        let truncated = out.truncated || err.truncated;
        let (stdout, stdout_bytes) = (out.text, out.total);
        let (stderr, stderr_bytes) = (err.text, err.total);
        let elapsed = start.elapsed();

        info!(
            "[exec] exit {exit_code} in {:.2}s (stdout {stdout_bytes} bytes, stderr {stderr_bytes} bytes{}{})",
            elapsed.as_secs_f64(),
            if truncated { ", truncated" } else { "" },
            if timed_out { ", timed out" } else { "" },
        );

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code,
            truncated,
            timed_out,
            stdout_bytes,
            stderr_bytes,
            elapsed,
            timeout,
            pid,
        })
    }
}
