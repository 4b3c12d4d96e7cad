//! Command execution.
//!
//! Every command writes its normal output to `out` and reads piped input
//! from `input`, so the whole driver can be exercised in-process.

use std::io::{Read, Write};
use std::time::Duration;

use adf_session::SessionError;
use adf_session::runner::Interpreter;
use adf_session::session::{SessionHandle, SessionManager};
use serde_json::Value;
use tracing::{debug, info};

use crate::cli::{ArtifactCommand, Cli, Command, ExecArgs, SessionCommand, SkillsCommand};
use crate::config::AgentConfig;
use crate::error::CliError;

pub type CliResult<T> = Result<T, CliError>;

/// Run the parsed command. Returns the process exit code.
pub async fn run(
    cli: &Cli,
    config: &AgentConfig,
    input: &mut dyn Read,
    out: &mut dyn Write,
) -> CliResult<i32> {
    let manager = config.manager()?;
    debug!("Sessions root: {}", manager.root().display());

    match &cli.command {
        Command::Session { action } => session_command(cli, &manager, action, out),
        Command::Artifact { action } => {
            let session = resolve_session(&manager, cli.session.as_deref())?;
            artifact_command(&session, action, input, out)
        }
        Command::Exec(args) => {
            let session = resolve_session(&manager, cli.session.as_deref())?;
            exec_command(config, &session, args, input, out).await
        }
        Command::Skills { action } => skills_command(config, action, out),
        Command::Tools => {
            let session = resolve_or_create(&manager, cli.session.as_deref())?;
            let defs = config.build_tool_set(&session).definitions();
            let json = serde_json::to_string_pretty(&defs).map_err(|source| {
                CliError::InvalidJson {
                    origin: "tool definitions".into(),
                    source,
                }
            })?;
            emit(out, &json)?;
            Ok(0)
        }
        Command::Call { tool, args } => {
            let session = resolve_or_create(&manager, cli.session.as_deref())?;
            let tools = config.build_tool_set(&session);
            let observation = tools.execute(tool, args).await;
            emit(out, &observation)?;
            Ok(observation_exit_code(&observation))
        }
    }
}

/// `--session ID`, or the newest session.
fn resolve_session(manager: &SessionManager, id: Option<&str>) -> CliResult<SessionHandle> {
    match id {
        Some(id) => Ok(manager.open_session(id)?),
        None => {
            let latest = manager
                .latest_session()?
                .ok_or(SessionError::NoActiveSession)?;
            Ok(manager.open_session(latest.id())?)
        }
    }
}

/// Like [`resolve_session`], but creates a session when none exists yet.
fn resolve_or_create(manager: &SessionManager, id: Option<&str>) -> CliResult<SessionHandle> {
    match resolve_session(manager, id) {
        Err(CliError::Session(SessionError::NoActiveSession)) => {
            info!("No sessions yet, creating one");
            Ok(manager.create_session()?)
        }
        other => other,
    }
}

fn observation_exit_code(observation: &str) -> i32 {
    let trimmed = observation.trim_start();
    if trimmed.starts_with("Error:") || trimmed.starts_with(adf_session::digest::FAILURE_PREFIX) {
        1
    } else {
        0
    }
}

fn emit(out: &mut dyn Write, text: &str) -> CliResult<()> {
    writeln!(out, "{text}").map_err(|e| CliError::io("failed to write output", e))
}

// ── session ────────────────────────────────────────────────────────

fn session_command(
    cli: &Cli,
    manager: &SessionManager,
    action: &SessionCommand,
    out: &mut dyn Write,
) -> CliResult<i32> {
    match action {
        SessionCommand::New => {
            let session = manager.create_session()?;
            emit(out, &format!("{}\t{}", session.id(), session.dir().display()))?;
        }
        SessionCommand::List => {
            let sessions = manager.list_sessions()?;
            if sessions.is_empty() {
                emit(out, "No sessions.")?;
            }
            for session in sessions {
                let count = session.artifacts().list().map(|a| a.len()).unwrap_or(0);
                emit(
                    out,
                    &format!(
                        "{}\t{}\t{count} artifact{}",
                        session.id(),
                        session.created_at().format("%Y-%m-%d %H:%M:%S"),
                        if count == 1 { "" } else { "s" }
                    ),
                )?;
            }
        }
        SessionCommand::Show { id } => {
            let id = id.as_deref().or(cli.session.as_deref());
            let session = resolve_session(manager, id)?;
            emit(out, &format!("Session: {}", session.id()))?;
            emit(out, &format!("Path:    {}", session.dir().display()))?;
            emit(
                out,
                &format!("Created: {}", session.created_at().format("%Y-%m-%d %H:%M:%S%.3f")),
            )?;
            let artifacts = session.artifacts().list()?;
            if artifacts.is_empty() {
                emit(out, "No artifacts.")?;
            }
            for a in artifacts {
                emit(out, &format!("  {}\t{} bytes", a.name, a.size_bytes))?;
            }
        }
        SessionCommand::Remove { id } => {
            manager.remove_session(id)?;
            emit(out, &format!("Removed session {id}"))?;
        }
    }
    Ok(0)
}

// ── artifact ───────────────────────────────────────────────────────

fn artifact_command(
    session: &SessionHandle,
    action: &ArtifactCommand,
    input: &mut dyn Read,
    out: &mut dyn Write,
) -> CliResult<i32> {
    let store = session.artifacts();
    match action {
        ArtifactCommand::Save { name, file } => {
            let (origin, text) = match file {
                Some(path) => (
                    path.display().to_string(),
                    std::fs::read_to_string(path)
                        .map_err(|e| CliError::io(format!("failed to read {}", path.display()), e))?,
                ),
                None => ("stdin".to_string(), read_all(input)?),
            };
            let value: Value = serde_json::from_str(&text)
                .map_err(|source| CliError::InvalidJson { origin, source })?;
            let staged = store.stage(name, &value)?;
            emit(out, &staged.summary())?;
        }
        ArtifactCommand::Load { name } => {
            let text = store.load_text(name)?;
            emit(out, text.trim_end())?;
        }
        ArtifactCommand::Describe { name } => {
            emit(out, &store.describe(name)?.to_string())?;
        }
        ArtifactCommand::List => {
            for a in store.list()? {
                emit(out, &format!("{}\t{} bytes", a.name, a.size_bytes))?;
            }
        }
    }
    Ok(0)
}

fn read_all(input: &mut dyn Read) -> CliResult<String> {
    let mut text = String::new();
    input
        .read_to_string(&mut text)
        .map_err(|e| CliError::io("failed to read stdin", e))?;
    Ok(text)
}

// ── exec ───────────────────────────────────────────────────────────

async fn exec_command(
    config: &AgentConfig,
    session: &SessionHandle,
    args: &ExecArgs,
    input: &mut dyn Read,
    out: &mut dyn Write,
) -> CliResult<i32> {
    let code = match (&args.code, &args.file) {
        (Some(code), _) => code.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| CliError::io(format!("failed to read {}", path.display()), e))?,
        (None, None) => read_all(input)?,
    };

    let mut runner = session.runner(&config.session);
    if args.shell {
        runner = runner.with_interpreter(Interpreter::shell());
    }
    let timeout = args
        .timeout
        .map_or(config.session.default_timeout, Duration::from_secs);

    let outcome = runner.run_summarized(&code, timeout).await?;
    if args.json {
        let json = serde_json::to_string_pretty(&outcome).map_err(|source| {
            CliError::InvalidJson {
                origin: "script outcome".into(),
                source,
            }
        })?;
        emit(out, &json)?;
    } else {
        emit(out, &outcome.render(config.session.max_result_bytes))?;
    }
    Ok(outcome.execution.exit_code)
}

// ── skills ─────────────────────────────────────────────────────────

fn skills_command(
    config: &AgentConfig,
    action: &SkillsCommand,
    out: &mut dyn Write,
) -> CliResult<i32> {
    let loader = config.skill_loader();
    match action {
        SkillsCommand::List => {
            let skills = loader.scan();
            if skills.is_empty() {
                emit(out, "No skills found.")?;
            }
            for skill in skills {
                emit(out, &skill.to_prompt_line())?;
            }
        }
        SkillsCommand::Show { name } => {
            let Some(skill) = loader.load(name) else {
                let names: Vec<String> = loader.scan().into_iter().map(|s| s.name).collect();
                return Err(CliError::SkillNotFound {
                    name: name.clone(),
                    available: if names.is_empty() {
                        "none".into()
                    } else {
                        names.join(", ")
                    },
                });
            };
            emit(out, &format!("# Skill: {}\n", skill.metadata.name))?;
            emit(out, &skill.instructions)?;
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Cursor;
    use std::path::Path;

    struct Fixture {
        root: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                root: tempfile::tempdir().unwrap(),
            }
        }

        fn sessions(&self) -> std::path::PathBuf {
            self.root.path().join("sessions")
        }

        fn skills(&self) -> std::path::PathBuf {
            self.root.path().join("skills")
        }

        async fn run_with_input(&self, args: &[&str], input: &str) -> (CliResult<i32>, String) {
            let sessions = self.sessions();
            let skills = self.skills();
            let mut argv = vec![
                "adf-agent",
                "--sessions-dir",
                sessions.to_str().unwrap(),
                "--skills-dir",
                skills.to_str().unwrap(),
            ];
            argv.extend_from_slice(args);
            let cli = Cli::try_parse_from(argv).unwrap();
            let config = AgentConfig::from_parts(&cli, adf_session::config::SessionConfig::default());
            let mut input = Cursor::new(input.as_bytes().to_vec());
            let mut out = Vec::new();
            let result = super::run(&cli, &config, &mut input, &mut out).await;
            (result, String::from_utf8(out).unwrap())
        }

        async fn run(&self, args: &[&str]) -> (CliResult<i32>, String) {
            self.run_with_input(args, "").await
        }
    }

    fn write_skill(dir: &Path, name: &str, body: &str) {
        let skill = dir.join(name);
        std::fs::create_dir_all(&skill).unwrap();
        std::fs::write(
            skill.join("SKILL.md"),
            format!("---\nname: {name}\ndescription: about {name}\n---\n{body}"),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn session_new_and_list() {
        let h = Fixture::new();
        let (code, out) = h.run(&["session", "list"]).await;
        assert_eq!(code.unwrap(), 0);
        assert_eq!(out, "No sessions.\n");

        let (code, out) = h.run(&["session", "new"]).await;
        assert_eq!(code.unwrap(), 0);
        let id = out.split('\t').next().unwrap().to_string();

        let (_, out) = h.run(&["session", "list"]).await;
        assert!(out.starts_with(&id));
        assert!(out.trim_end().ends_with("0 artifacts"));
    }

    #[tokio::test]
    async fn artifact_commands_need_a_session() {
        let h = Fixture::new();
        let (result, _) = h.run(&["artifact", "list"]).await;
        let err = result.unwrap_err();
        assert!(matches!(err, CliError::Session(SessionError::NoActiveSession)));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn artifact_save_describe_load() {
        let h = Fixture::new();
        h.run(&["session", "new"]).await.0.unwrap();

        let (code, out) = h
            .run_with_input(
                &["artifact", "save", "datasets"],
                r#"[{"name": "d1", "linked_service": "ls1"}, {"name": "d2"}]"#,
            )
            .await;
        assert_eq!(code.unwrap(), 0);
        assert!(out.starts_with("[OK] Saved 2 items to datasets.json"));

        let (_, out) = h.run(&["artifact", "describe", "datasets"]).await;
        assert_eq!(out, "list[2] of {\n  name: string\n  linked_service?: string\n}\n");

        let (_, out) = h.run(&["artifact", "load", "datasets.json"]).await;
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["linked_service"], "ls1");

        let (_, out) = h.run(&["artifact", "list"]).await;
        assert!(out.starts_with("datasets.json\t"));
    }

    #[tokio::test]
    async fn artifact_save_rejects_invalid_json() {
        let h = Fixture::new();
        h.run(&["session", "new"]).await.0.unwrap();
        let (result, _) = h
            .run_with_input(&["artifact", "save", "broken"], "{not json")
            .await;
        assert!(matches!(result, Err(CliError::InvalidJson { .. })));
    }

    #[tokio::test]
    async fn exec_mirrors_script_exit_code() {
        let h = Fixture::new();
        h.run(&["session", "new"]).await.0.unwrap();

        let (code, out) = h.run(&["exec", "--shell", "--code", "echo hello"]).await;
        assert_eq!(code.unwrap(), 0);
        assert!(out.starts_with("[OK] exit 0"));
        assert!(out.contains("\nhello\n"));

        let (code, out) = h
            .run_with_input(&["exec", "--shell"], "echo bad >&2; exit 4")
            .await;
        assert_eq!(code.unwrap(), 4);
        assert!(out.starts_with("[FAILED] exit 4"));
        assert!(out.contains("bad"));
    }

    #[tokio::test]
    async fn exec_json_output() {
        let h = Fixture::new();
        h.run(&["session", "new"]).await.0.unwrap();
        let (code, out) = h
            .run(&["exec", "--shell", "--json", "--code", "echo '{}' > results.json; echo done"])
            .await;
        assert_eq!(code.unwrap(), 0);
        let json: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["digest"], "done");
        assert_eq!(json["execution"]["exit_code"], 0);
        assert!(json["artifact_ref"].as_str().unwrap().ends_with("results.json"));
    }

    #[tokio::test]
    async fn explicit_session_flag() {
        let h = Fixture::new();
        let (_, first) = h.run(&["session", "new"]).await;
        let first_id = first.split('\t').next().unwrap().to_string();
        h.run(&["session", "new"]).await.0.unwrap();

        h.run_with_input(&["--session", &first_id, "artifact", "save", "x"], "[1]")
            .await
            .0
            .unwrap();
        let (_, out) = h.run(&["session", "show", &first_id]).await;
        assert!(out.contains("x.json"));
        // The newest session is the default and has nothing in it.
        let (_, out) = h.run(&["artifact", "list"]).await;
        assert_eq!(out, "");

        let (result, _) = h.run(&["--session", "nope", "artifact", "list"]).await;
        assert_eq!(result.unwrap_err().exit_code(), 3);
    }

    #[tokio::test]
    async fn session_remove() {
        let h = Fixture::new();
        let (_, out) = h.run(&["session", "new"]).await;
        let id = out.split('\t').next().unwrap().to_string();
        let (code, out) = h.run(&["session", "remove", &id]).await;
        assert_eq!(code.unwrap(), 0);
        assert_eq!(out, format!("Removed session {id}\n"));
        let (_, out) = h.run(&["session", "list"]).await;
        assert_eq!(out, "No sessions.\n");
    }

    #[tokio::test]
    async fn tools_and_call() {
        let h = Fixture::new();
        let (code, out) = h.run(&["tools"]).await;
        assert_eq!(code.unwrap(), 0);
        let defs: Vec<Value> = serde_json::from_str(&out).unwrap();
        let names: Vec<&str> = defs
            .iter()
            .map(|d| d["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "describe_artifact",
                "exec_script",
                "list_artifacts",
                "load_skill",
                "read_artifact"
            ]
        );

        let (code, out) = h.run(&["call", "list_artifacts"]).await;
        assert_eq!(code.unwrap(), 0);
        assert_eq!(out, "No artifacts in this session yet.\n");

        let (code, out) = h
            .run(&["call", "describe_artifact", r#"{"name":"missing"}"#])
            .await;
        assert_eq!(code.unwrap(), 1);
        assert!(out.starts_with("Error: "));
    }

    #[tokio::test]
    async fn skills_list_and_show() {
        let h = Fixture::new();
        let (_, out) = h.run(&["skills", "list"]).await;
        assert_eq!(out, "No skills found.\n");

        write_skill(&h.skills(), "lineage", "# Lineage\nFollow the links.");
        let (_, out) = h.run(&["skills", "list"]).await;
        assert_eq!(out, "- **lineage**: about lineage\n");

        let (code, out) = h.run(&["skills", "show", "lineage"]).await;
        assert_eq!(code.unwrap(), 0);
        assert_eq!(out, "# Skill: lineage\n\n# Lineage\nFollow the links.\n");

        let (result, _) = h.run(&["skills", "show", "other"]).await;
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "skill 'other' not found (available: lineage)");
    }
}
