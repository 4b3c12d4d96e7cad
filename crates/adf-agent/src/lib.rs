//! Command-line driver for ADF agent sessions.
//!
//! `adf-agent` exposes the `adf-session` workspace from the shell: create
//! and inspect sessions, stage JSON artifacts, run analysis scripts, browse
//! skills, and dispatch the same tool calls a reasoning loop would make.
//!
//! ```sh
//! adf-agent session new
//! adf-agent artifact save datasets --file datasets.json
//! adf-agent artifact describe datasets
//! adf-agent exec --code "print(len(load_json('datasets')))"
//! adf-agent call read_artifact '{"name": "results", "max_items": 5}'
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;

pub use cli::Cli;
pub use config::AgentConfig;
pub use error::CliError;
