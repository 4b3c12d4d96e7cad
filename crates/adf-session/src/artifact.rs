//! Named JSON artifacts stored as files in a session directory.
//!
//! Tool wrappers that fetch bulk data (pipeline definitions, dataset and
//! linked-service lists) save it here instead of returning it inline; scripts
//! run by the [`ScriptRunner`](crate::runner::ScriptRunner) read it back from
//! the same directory.
//!
//! The store performs no schema validation. Producers and consumers agree on
//! field names out of band, so the documented protocol for script authors is:
//! inspect an artifact first ([`ArtifactStore::describe`] or a sample read),
//! then write code against the fields that actually exist.
//!
//! Writes go to a unique temp file and are renamed into place, so concurrent
//! writers to different names never interfere and concurrent writers to the
//! same name leave exactly one complete value (last write wins).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};
use crate::session::SessionHandle;
use crate::shape::Shape;

/// File extension of every artifact.
pub const ARTIFACT_EXTENSION: &str = ".json";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Map an artifact name to its file name.
///
/// `.json` is appended unless already present, so `datasets` and
/// `datasets.json` address the same artifact.
pub fn artifact_file_name(name: &str) -> Result<String> {
    let invalid = |reason| SessionError::InvalidArtifactName {
        name: name.to_string(),
        reason,
    };
    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(invalid("name must not contain path separators"));
    }
    if name.starts_with('.') {
        return Err(invalid("name must not start with '.'"));
    }
    if name.ends_with(ARTIFACT_EXTENSION) {
        if name.len() == ARTIFACT_EXTENSION.len() {
            return Err(invalid("name is empty"));
        }
        Ok(name.to_string())
    } else {
        Ok(format!("{name}{ARTIFACT_EXTENSION}"))
    }
}

/// Listing entry for one stored artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    /// File name, including the `.json` extension.
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(skip)]
    pub modified: Option<SystemTime>,
}

/// Outcome of [`ArtifactStore::stage`]: where bulky data went, plus enough
/// to describe it in one line.
#[derive(Debug, Clone, Serialize)]
pub struct StagedArtifact {
    pub name: String,
    pub path: PathBuf,
    /// Element count for arrays, key count for objects, `None` for scalars.
    pub item_count: Option<usize>,
    pub size_bytes: u64,
}

impl StagedArtifact {
    /// One-line, token-cheap summary returned to the reasoning loop in place
    /// of the data itself.
    pub fn summary(&self) -> String {
        let what = match self.item_count {
            Some(1) => "1 item".to_string(),
            Some(n) => format!("{n} items"),
            None => "value".to_string(),
        };
        format!(
            "[OK] Saved {what} to {} ({} bytes). Use describe_artifact or exec_script to inspect it.",
            self.name, self.size_bytes
        )
    }
}

/// JSON artifact store scoped to one session.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    session: SessionHandle,
}

impl ArtifactStore {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Path an artifact is (or would be) stored at.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        Ok(self.session.dir().join(artifact_file_name(name)?))
    }

    /// Serialize `value` and store it under `name`, replacing any previous
    /// artifact of that name. Returns the artifact path.
    pub fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let file_name = artifact_file_name(name)?;
        self.session.ensure_live()?;

        let bytes = serde_json::to_vec_pretty(value).map_err(|source| SessionError::Serialize {
            name: file_name.clone(),
            source,
        })?;

        let dir = self.session.dir();
        let final_path = dir.join(&file_name);
        let tmp_path = dir.join(format!(
            ".{file_name}.tmp-{}-{}",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        std::fs::write(&tmp_path, &bytes).map_err(|e| SessionError::io_at("write", &tmp_path, e))?;
        if let Err(e) = std::fs::rename(&tmp_path, &final_path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(SessionError::io_at("replace", &final_path, e));
        }

        debug!(
            "[artifact] saved {file_name} ({} bytes) in session {}",
            bytes.len(),
            self.session.id()
        );
        Ok(final_path)
    }

    /// Read an artifact back as JSON.
    pub fn load(&self, name: &str) -> Result<Value> {
        let (file_name, bytes) = self.read_bytes(name)?;
        serde_json::from_slice(&bytes).map_err(|source| SessionError::ArtifactCorrupt {
            name: file_name,
            source,
        })
    }

    /// Whether an artifact with this name exists.
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.path_for(name)?.is_file())
    }

    /// All artifacts in the session, sorted by name. Dot-files (including
    /// in-flight temp files) and non-JSON files are skipped.
    pub fn list(&self) -> Result<Vec<ArtifactInfo>> {
        self.session.ensure_live()?;
        let dir = self.session.dir();
        let entries = std::fs::read_dir(dir).map_err(|e| SessionError::io_at("read", dir, e))?;

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SessionError::io_at("read", dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !name.ends_with(ARTIFACT_EXTENSION) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                // Removed between read_dir and stat.
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            artifacts.push(ArtifactInfo {
                name,
                path: entry.path(),
                size_bytes: meta.len(),
                modified: meta.modified().ok(),
            });
        }
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artifacts)
    }

    /// Structural summary (keys, types, optionality) of a stored artifact.
    pub fn describe(&self, name: &str) -> Result<Shape> {
        Ok(Shape::of(&self.load(name)?))
    }

    /// Save a bulky value and return a one-line description of it.
    pub fn stage(&self, name: &str, value: &Value) -> Result<StagedArtifact> {
        let path = self.save(name, value)?;
        let size_bytes = std::fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|e| SessionError::io_at("stat", &path, e))?;
        let item_count = match value {
            Value::Array(items) => Some(items.len()),
            Value::Object(map) => Some(map.len()),
            _ => None,
        };
        Ok(StagedArtifact {
            name: file_name_of(&path),
            path,
            item_count,
            size_bytes,
        })
    }

    /// Raw stored text, for display paths that should not re-serialize.
    pub fn load_text(&self, name: &str) -> Result<String> {
        let (_, bytes) = self.read_bytes(name)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_bytes(&self, name: &str) -> Result<(String, Vec<u8>)> {
        let file_name = artifact_file_name(name)?;
        let path = self.session.dir().join(&file_name);
        match std::fs::read(&path) {
            Ok(bytes) => {
                trace!("[artifact] read {file_name} ({} bytes)", bytes.len());
                Ok((file_name, bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SessionError::ArtifactNotFound { name: file_name })
            }
            Err(e) => Err(SessionError::io_at("read", &path, e)),
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

// ── Tests ──────────────────────────────────────────────────────────
