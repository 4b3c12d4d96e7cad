//! Session tools exposed to the reasoning loop.
//!
//! These are the only way the loop touches session data: it stages nothing
//! itself, inspects artifacts by shape or capped preview, and runs code that
//! prints a digest and writes complete results to the result artifact.

use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::core::{Tool, ToolFuture, ToolSet, parse_tool_args};
use super::spec::ToolSpec;
use crate::ToolDef;
use crate::artifact::ArtifactStore;
use crate::config::SessionConfig;
use crate::runner::ScriptRunner;
use crate::session::SessionHandle;
use crate::skills::SkillLoader;

/// Default cap on array elements shown by `read_artifact`.
pub const DEFAULT_READ_MAX_ITEMS: usize = 20;

// ── exec_script ────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct ExecScriptArgs {
    /// Python code to run. The working directory is the session directory;
    /// load_json(name), save_json(name, data), save_result(data) and
    /// pretty_print(data) are predefined.
    pub code: String,
    /// Timeout in seconds. Defaults to the configured timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

pub struct ExecScript {
    runner: ScriptRunner,
    max_render_bytes: usize,
}

impl ExecScript {
    pub fn new(runner: ScriptRunner, max_render_bytes: usize) -> Self {
        Self {
            runner,
            max_render_bytes,
        }
    }
}

impl Tool for ExecScript {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder("exec_script")
            .purpose("Run analysis code over the session's artifacts in an isolated process")
            .when_to_use(
                "Filtering, joining or counting artifact data. Print a short summary \
                 to stdout and call save_result(data) with the complete answer.",
            )
            .when_not_to_use(
                "To look at an artifact's keys (use describe_artifact) or a few \
                 sample records (use read_artifact). Never print whole artifacts.",
            )
            .parameters_for::<ExecScriptArgs>()
            .example(
                "code=\"ds = load_json('datasets'); m = [d for d in ds if d['linked_service'] == 'ls1']; save_result(m); print(len(m), 'matched')\"",
                "[OK] exit 0 ... 3 matched / Result artifact: .../results.json",
            )
            .output_format(
                "[OK] or [FAILED] status line with exit code, then stdout, the result \
                 artifact path if one was written, and the stderr tail on failure",
            )
            .disambiguate(
                "A KeyError on a field name",
                "describe_artifact",
                "check the real key names before retrying",
            )
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<ExecScriptArgs>(arguments);
        Box::pin(async move {
            let args = match parsed {
                Ok(a) => a,
                Err(e) => return e,
            };
            let timeout = args
                .timeout_secs
                .map_or(self.runner.default_timeout(), Duration::from_secs);
            match self.runner.run_summarized(&args.code, timeout).await {
                Ok(outcome) => outcome.render(self.max_render_bytes),
                Err(e) => format!("Error: {e}"),
            }
        })
    }
}

// ── list_artifacts ─────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct ListArtifactsArgs {}

pub struct ListArtifacts {
    store: ArtifactStore,
}

impl ListArtifacts {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }
}

impl Tool for ListArtifacts {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder("list_artifacts")
            .purpose("List the artifacts stored in the current session")
            .when_to_use("To find out which data has been staged before referencing it in code")
            .when_not_to_use("To inspect an artifact's contents (use describe_artifact)")
            .parameters_for::<ListArtifactsArgs>()
            .output_format("One line per artifact: name and size in bytes")
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<ListArtifactsArgs>(arguments);
        Box::pin(async move {
            if let Err(e) = parsed {
                return e;
            }
            let artifacts = match self.store.list() {
                Ok(a) => a,
                Err(e) => return format!("Error: {e}"),
            };
            if artifacts.is_empty() {
                return "No artifacts in this session yet.".to_string();
            }
            let mut out = format!(
                "{} artifact{} in session {}:",
                artifacts.len(),
                if artifacts.len() == 1 { "" } else { "s" },
                self.store.session().id()
            );
            for a in &artifacts {
                out.push_str(&format!("\n- {} ({} bytes)", a.name, a.size_bytes));
            }
            out
        })
    }
}

// ── describe_artifact ──────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct ArtifactNameArgs {
    /// Artifact name, with or without the .json extension.
    pub name: String,
}

pub struct DescribeArtifact {
    store: ArtifactStore,
}

impl DescribeArtifact {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }
}

impl Tool for DescribeArtifact {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder("describe_artifact")
            .purpose("Show the structure of an artifact: keys, value types and which keys are optional")
            .when_to_use("Before writing code against an artifact, to get field names right")
            .when_not_to_use("When you need actual values (use read_artifact or exec_script)")
            .parameters_for::<ArtifactNameArgs>()
            .example("name=\"datasets\"", "list[2] of { linked_service: string, name: string }")
            .output_format("Indented type outline; `key?` marks keys missing from some records")
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<ArtifactNameArgs>(arguments);
        Box::pin(async move {
            let args = match parsed {
                Ok(a) => a,
                Err(e) => return e,
            };
            match self.store.describe(&args.name) {
                Ok(shape) => format!("{}: {shape}", display_name(&args.name)),
                Err(e) => artifact_error(&self.store, e),
            }
        })
    }
}

// ── read_artifact ──────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct ReadArtifactArgs {
    /// Artifact name, with or without the .json extension.
    pub name: String,
    /// Maximum array elements to show (default 20).
    #[serde(default)]
    pub max_items: Option<usize>,
}

pub struct ReadArtifact {
    store: ArtifactStore,
}

impl ReadArtifact {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }
}

impl Tool for ReadArtifact {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder("read_artifact")
            .purpose("Show an artifact as pretty JSON, with long lists cut to the first items")
            .when_to_use("To look at a few sample records or read a small result")
            .when_not_to_use(
                "To search, filter or count large artifacts (use exec_script, which \
                 keeps bulk data out of the conversation)",
            )
            .parameters_for::<ReadArtifactArgs>()
            .output_format("Pretty-printed JSON, preceded by a note when a list was cut")
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<ReadArtifactArgs>(arguments);
        Box::pin(async move {
            let args = match parsed {
                Ok(a) => a,
                Err(e) => return e,
            };
            let value = match self.store.load(&args.name) {
                Ok(v) => v,
                Err(e) => return artifact_error(&self.store, e),
            };
            preview(value, args.max_items.unwrap_or(DEFAULT_READ_MAX_ITEMS))
        })
    }
}

/// Pretty JSON with top-level arrays capped at `max_items`.
pub fn preview(value: Value, max_items: usize) -> String {
    let (note, value) = match value {
        Value::Array(mut items) if items.len() > max_items => {
            let total = items.len();
            items.truncate(max_items);
            (
                Some(format!("Showing first {max_items} of {total} items:")),
                Value::Array(items),
            )
        }
        other => (None, other),
    };
    let body = serde_json::to_string_pretty(&value).unwrap_or_else(|e| format!("Error: {e}"));
    match note {
        Some(note) => format!("{note}\n{body}"),
        None => body,
    }
}

fn display_name(name: &str) -> String {
    crate::artifact::artifact_file_name(name).unwrap_or_else(|_| name.to_string())
}

/// Error observation; a missing artifact also lists what does exist.
fn artifact_error(store: &ArtifactStore, err: crate::SessionError) -> String {
    if matches!(err, crate::SessionError::ArtifactNotFound { .. }) {
        let available: Vec<String> = store
            .list()
            .map(|a| a.into_iter().map(|i| i.name).collect())
            .unwrap_or_default();
        let available = if available.is_empty() {
            "none".to_string()
        } else {
            available.join(", ")
        };
        return format!("Error: {err}. Available artifacts: {available}");
    }
    format!("Error: {err}")
}

// ── load_skill ─────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct LoadSkillArgs {
    /// Name of the skill to load, as listed in the available skills.
    pub skill_name: String,
}

pub struct LoadSkill {
    loader: SkillLoader,
}

impl LoadSkill {
    pub fn new(loader: SkillLoader) -> Self {
        Self { loader }
    }
}

impl Tool for LoadSkill {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder("load_skill")
            .purpose("Load a skill's detailed instructions")
            .when_to_use("When the request matches a skill's description in the available skills list")
            .when_not_to_use("For skills that are not listed")
            .parameters_for::<LoadSkillArgs>()
            .output_format("Markdown instructions followed by the skill directory path")
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<LoadSkillArgs>(arguments);
        Box::pin(async move {
            let args = match parsed {
                Ok(a) => a,
                Err(e) => return e,
            };
            let name = args.skill_name;
            let Some(skill) = self.loader.load(&name) else {
                let available: Vec<String> =
                    self.loader.scan().into_iter().map(|s| s.name).collect();
                return if available.is_empty() {
                    format!("Skill '{name}' not found. No skills are currently available.")
                } else {
                    format!(
                        "Skill '{name}' not found. Available skills: {}",
                        available.join(", ")
                    )
                };
            };
            format!(
                "# Skill: {name}\n\n{}\n\n## Skill Directory: `{}`",
                skill.instructions,
                skill.metadata.skill_path.display()
            )
        })
    }
}

// ── Registration ───────────────────────────────────────────────────

impl ToolSet {
    /// `exec_script`, `list_artifacts`, `describe_artifact` and
    /// `read_artifact`, bound to one session.
    pub fn with_session_tools(self, session: &SessionHandle, config: &SessionConfig) -> Self {
        let max = self.max_result_bytes();
        self.with(ExecScript::new(session.runner(config), max))
            .with(ListArtifacts::new(session.artifacts()))
            .with(DescribeArtifact::new(session.artifacts()))
            .with(ReadArtifact::new(session.artifacts()))
    }

    pub fn with_skill_tools(self, loader: SkillLoader) -> Self {
        self.with(LoadSkill::new(loader))
    }

    /// Session tools plus `load_skill` when a loader is given, with the
    /// result cap taken from `config` and argument validation on.
    pub fn for_session(
        session: &SessionHandle,
        config: &SessionConfig,
        skills: Option<SkillLoader>,
    ) -> Self {
        let tools = ToolSet::new()
            .with_max_result_bytes(config.max_result_bytes)
            .with_arg_validation(true)
            .with_session_tools(session, config);
        match skills {
            Some(loader) => tools.with_skill_tools(loader),
            None => tools,
        }
    }
}
