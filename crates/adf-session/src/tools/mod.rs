//! Function-calling tools over a session.
//!
//! - [`core`]: [`Tool`] trait and [`ToolSet`] dispatch (validation,
//!   timeout, truncation).
//! - [`spec`]: [`ToolSpec`](spec::ToolSpec) builder for descriptions with
//!   `when_to_use` / `when_not_to_use` guidance.
//! - [`session`]: `exec_script`, `list_artifacts`, `describe_artifact`,
//!   `read_artifact` and `load_skill`. Register them with
//!   [`ToolSet::for_session`].

pub mod core;
pub mod session;
pub mod spec;

pub use self::core::{
    Tool, ToolFuture, ToolSet, log_tool_call, parse_tool_args, validate_tool_arguments,
};
pub use self::session::{DescribeArtifact, ExecScript, ListArtifacts, LoadSkill, ReadArtifact};
pub use self::spec::ToolSpec;
