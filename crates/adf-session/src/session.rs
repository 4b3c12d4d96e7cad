//! Per-invocation session directories.
//!
//! Each agent invocation gets its own directory under the sessions root,
//! named after its creation timestamp. Artifacts and script results for the
//! invocation live inside it. Sessions never expire on their own; they are
//! removed only by explicit cleanup ([`SessionManager::remove_session`]).
//!
//! There is no process-wide "current session". A [`SessionManager`] tracks
//! the active session for the code that owns it, and every store, runner and
//! tool receives a [`SessionHandle`] explicitly.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactStore;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::runner::ScriptRunner;

/// Timestamp format used for session ids (`20261016-093012-481`).
const SESSION_ID_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

/// Length of a formatted timestamp id, without any collision suffix.
const SESSION_ID_LEN: usize = 19;

/// Give up after this many same-millisecond collisions.
const MAX_ID_ATTEMPTS: u32 = 1000;

// ── SessionHandle ──────────────────────────────────────────────────

/// Cheap, clonable reference to one session directory.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    dir: PathBuf,
    created_at: DateTime<Local>,
}

impl SessionHandle {
    fn new(id: String, dir: PathBuf, created_at: DateTime<Local>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                dir,
                created_at,
            }),
        }
    }

    /// Session id (the directory name).
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Absolute path of the session directory.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.inner.created_at
    }

    /// Whether the directory still exists on disk.
    pub fn is_live(&self) -> bool {
        self.inner.dir.is_dir()
    }

    /// Artifact store rooted at this session.
    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(self.clone())
    }

    /// Script runner executing inside this session.
    pub fn runner(&self, config: &SessionConfig) -> ScriptRunner {
        ScriptRunner::new(self.clone(), config)
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(crate::error::session_gone(self.id(), self.dir()))
        }
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.dir == other.inner.dir
    }
}

impl Eq for SessionHandle {}

// ── SessionManager ─────────────────────────────────────────────────

/// Creates, reopens and removes session directories, and tracks which one
/// is active for its owner.
///
/// Directory layout:
/// ```text
/// sessions_root/
///   20261016-093012-481/
///     pipelines.json
///     datasets.json
///     results.json
///   20261016-101544-007/
/// ```
#[derive(Debug)]
pub struct SessionManager {
    root: PathBuf,
    active: Mutex<Option<SessionHandle>>,
}

impl SessionManager {
    /// Create a manager, ensuring the sessions root exists.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| SessionError::io_at("create", &root, e))?;
        // Canonical paths keep SESSION_DIR absolute even for a relative root.
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Ok(Self {
            root,
            active: Mutex::new(None),
        })
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Self::new(&config.sessions_root)
    }

    /// The sessions root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh, empty session directory and make it active.
    ///
    /// The id is the local creation timestamp; when two sessions are created
    /// within the same millisecond the later one gets a `-N` suffix. An
    /// existing directory is never reused.
    pub fn create_session(&self) -> Result<SessionHandle> {
        let now = Local::now();
        let base = now.format(SESSION_ID_FORMAT).to_string();

        let mut attempt = 0;
        let (id, dir) = loop {
            let id = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let dir = self.root.join(&id);
            match std::fs::create_dir(&dir) {
                Ok(()) => break (id, dir),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    if attempt >= MAX_ID_ATTEMPTS {
                        return Err(SessionError::io_at("allocate session under", &self.root, e));
                    }
                }
                Err(e) => return Err(SessionError::io_at("create session", &dir, e)),
            }
        };

        let handle = SessionHandle::new(id, dir, now);
        info!(
            "Created session {} at {}",
            handle.id(),
            handle.dir().display()
        );
        self.set_active(Some(handle.clone()));
        Ok(handle)
    }

    /// The active session, or [`SessionError::NoActiveSession`].
    pub fn current_session(&self) -> Result<SessionHandle> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(SessionError::NoActiveSession)
    }

    /// Reattach to an existing session directory and make it active.
    pub fn open_session(&self, id: &str) -> Result<SessionHandle> {
        let handle = self.lookup(id)?;
        debug!("Opened session {}", handle.id());
        self.set_active(Some(handle.clone()));
        Ok(handle)
    }

    /// The newest session under the root, if any. Does not change the
    /// active session.
    pub fn latest_session(&self) -> Result<Option<SessionHandle>> {
        Ok(self.list_sessions()?.pop())
    }

    /// All sessions under the root, oldest first.
    pub fn list_sessions(&self) -> Result<Vec<SessionHandle>> {
        let entries =
            std::fs::read_dir(&self.root).map_err(|e| SessionError::io_at("read", &self.root, e))?;

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SessionError::io_at("read", &self.root, e))?;
            if !entry.file_type().is_ok_and(|ft| ft.is_dir()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let created_at = created_at_for(&name, &entry.path());
            sessions.push(SessionHandle::new(name, entry.path(), created_at));
        }
        // Timestamp ids sort chronologically; the suffix breaks ties.
        sessions.sort_by(|a, b| {
            (a.created_at(), a.id().len(), a.id()).cmp(&(b.created_at(), b.id().len(), b.id()))
        });
        Ok(sessions)
    }

    /// Clear the active session without deleting anything.
    pub fn end_session(&self) -> Option<SessionHandle> {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Delete a session directory and everything in it.
    pub fn remove_session(&self, id: &str) -> Result<()> {
        let handle = self.lookup(id)?;
        std::fs::remove_dir_all(handle.dir())
            .map_err(|e| SessionError::io_at("remove", handle.dir(), e))?;

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(|a| a == &handle) {
            *active = None;
        }
        info!("Removed session {id}");
        Ok(())
    }

    fn lookup(&self, id: &str) -> Result<SessionHandle> {
        if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
            return Err(SessionError::SessionNotFound { id: id.to_string() });
        }
        let dir = self.root.join(id);
        if !dir.is_dir() {
            return Err(SessionError::SessionNotFound { id: id.to_string() });
        }
        let created_at = created_at_for(id, &dir);
        Ok(SessionHandle::new(id.to_string(), dir, created_at))
    }

    fn set_active(&self, handle: Option<SessionHandle>) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = handle;
    }
}

/// Recover the creation time from a timestamp id, falling back to the
/// directory's modification time for ids in another format.
fn created_at_for(id: &str, dir: &Path) -> DateTime<Local> {
    if let Some(stamp) = id.get(..SESSION_ID_LEN)
        && let Ok(naive) = NaiveDateTime::parse_from_str(stamp, SESSION_ID_FORMAT)
        && let Some(local) = Local.from_local_datetime(&naive).earliest()
    {
        return local;
    }
    match std::fs::metadata(dir).and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Local>::from(modified),
        Err(e) => {
            warn!("Cannot read timestamp of session {id}: {e}");
            Local::now()
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
