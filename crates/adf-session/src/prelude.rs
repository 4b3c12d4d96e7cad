//! Glob-importable re-exports for callers driving a session.
//!
//! ```ignore
//! use adf_session::prelude::*;
//! ```

pub use crate::artifact::{ArtifactInfo, ArtifactStore, StagedArtifact};
pub use crate::config::SessionConfig;
pub use crate::digest::ScriptOutcome;
pub use crate::error::{Result, SessionError};
pub use crate::runner::{ExecutionResult, Interpreter, ScriptRunner};
pub use crate::session::{SessionHandle, SessionManager};
pub use crate::shape::Shape;
pub use crate::skills::{SkillContent, SkillLoader, SkillMetadata};
pub use crate::tools::{Tool, ToolFuture, ToolSet, ToolSpec, parse_tool_args};
pub use crate::{ToolDef, json_schema_for};
