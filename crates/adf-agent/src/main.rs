//! `adf-agent` binary.
//!
//! Exit codes: commands return 0 on success; `exec` mirrors the script's
//! exit code (124 on timeout); `call` returns 1 for error observations.
//! Driver errors exit with 1, 2 (no session) or 3 (session, artifact or
//! skill not found).

use std::io::Write;

use adf_agent::commands;
use adf_agent::{AgentConfig, Cli, logging};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = AgentConfig::from_cli(&cli);
    let mut stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();

    let code = match commands::run(&cli, &config, &mut stdin, &mut stdout).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    };
    let _ = stdout.flush();
    std::process::exit(code);
}
