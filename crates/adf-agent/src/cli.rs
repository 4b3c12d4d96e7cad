//! Command-line definition.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Drive ADF agent sessions: stage artifacts, run analysis scripts and
/// dispatch tool calls from the shell.
#[derive(Parser, Debug)]
#[command(name = "adf-agent", version)]
pub struct Cli {
    /// Directory holding one subdirectory per session.
    /// Overrides ADF_SESSIONS_DIR.
    #[arg(long, global = true)]
    pub sessions_dir: Option<PathBuf>,

    /// Session id to operate on. Defaults to the newest session.
    #[arg(long, global = true)]
    pub session: Option<String>,

    /// Project root searched for `.claude/skills`.
    #[arg(long, global = true, default_value = ".")]
    pub project_root: PathBuf,

    /// Skill directories to search instead of the defaults (repeatable).
    #[arg(long = "skills-dir", global = true)]
    pub skills_dirs: Vec<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    /// ADF_LOG takes precedence when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create, list, inspect or remove sessions.
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
    /// Store and inspect JSON artifacts in a session.
    Artifact {
        #[command(subcommand)]
        action: ArtifactCommand,
    },
    /// Run analysis code inside a session.
    Exec(ExecArgs),
    /// List or show skills.
    Skills {
        #[command(subcommand)]
        action: SkillsCommand,
    },
    /// Print the tool definitions as JSON.
    Tools,
    /// Dispatch one tool call and print the observation.
    Call {
        /// Tool name, e.g. `describe_artifact`.
        tool: String,
        /// JSON arguments object.
        #[arg(default_value = "{}")]
        args: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Create a new session.
    New,
    /// List sessions, oldest first.
    List,
    /// Show a session and its artifacts.
    Show {
        /// Session id. Defaults to `--session` or the newest session.
        id: Option<String>,
    },
    /// Delete a session directory and everything in it.
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ArtifactCommand {
    /// Save JSON (from stdin or --file) as an artifact.
    Save {
        name: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print an artifact's JSON.
    Load { name: String },
    /// Print an artifact's structure.
    Describe { name: String },
    /// List artifacts with their sizes.
    List,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Read the script from a file.
    #[arg(long, conflicts_with = "code")]
    pub file: Option<PathBuf>,

    /// Script source. Without --file or --code, the script is read from stdin.
    #[arg(long)]
    pub code: Option<String>,

    /// Timeout in seconds. Defaults to ADF_EXEC_TIMEOUT_SECS or 60.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Run with `sh` instead of the configured interpreter.
    #[arg(long)]
    pub shell: bool,

    /// Print the full outcome as JSON instead of the rendered summary.
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum SkillsCommand {
    /// One line per skill.
    List,
    /// Full instructions of one skill.
    Show { name: String },
}
