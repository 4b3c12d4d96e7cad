//! Driver configuration.
//!
//! [`AgentConfig`] combines the library's [`SessionConfig`] (defaults plus
//! `ADF_*` environment overrides) with command-line flags, and builds the
//! session manager, skill loader and tool set from it.

use std::path::PathBuf;

use adf_session::config::SessionConfig;
use adf_session::session::{SessionHandle, SessionManager};
use adf_session::skills::SkillLoader;
use adf_session::tools::ToolSet;

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub session: SessionConfig,
    /// Skill search paths, highest priority first.
    pub skill_paths: Vec<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            skill_paths: SkillLoader::default_paths(&PathBuf::from(".")),
        }
    }
}

impl AgentConfig {
    /// Environment first, then flags on top.
    pub fn from_cli(cli: &Cli) -> Self {
        Self::from_parts(cli, SessionConfig::from_env())
    }

    pub fn from_parts(cli: &Cli, mut session: SessionConfig) -> Self {
        if let Some(dir) = &cli.sessions_dir {
            session = session.with_sessions_root(dir);
        }
        let skill_paths = if cli.skills_dirs.is_empty() {
            SkillLoader::default_paths(&cli.project_root)
        } else {
            cli.skills_dirs.clone()
        };
        Self {
            session,
            skill_paths,
        }
    }

    pub fn manager(&self) -> adf_session::Result<SessionManager> {
        SessionManager::from_config(&self.session)
    }

    pub fn skill_loader(&self) -> SkillLoader {
        SkillLoader::new(self.skill_paths.clone())
    }

    /// All session tools plus `load_skill`.
    pub fn build_tool_set(&self, session: &SessionHandle) -> ToolSet {
        ToolSet::for_session(session, &self.session, Some(self.skill_loader()))
    }
}
