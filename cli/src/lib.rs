use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use clap::Subcommand;

pub mod config;
pub mod logs_cmd;
pub mod run_cmd;

use crate::logs_cmd::LogsCli;
use crate::run_cmd::RunCli;

/// Supervises shell commands and keeps their output logs.
#[derive(Debug, Parser)]
#[command(name = "exec-agent", version)]
pub struct Cli {
    /// Config file to use instead of ~/.exec-agent/config.toml.
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: AgentCommand,
}

#[derive(Debug, Subcommand)]
pub enum AgentCommand {
    Run(RunCli),
    Logs(LogsCli),
}

/// Runs the selected subcommand and returns the process exit code.
pub async fn run_main(cli: Cli) -> Result<i32> {
    let config_path = cli.config.as_deref();
    match cli.command {
        AgentCommand::Run(run) => run_cmd::run(run, config_path).await,
        AgentCommand::Logs(logs) => {
            logs_cmd::run(logs, config_path).await?;
            Ok(0)
        }
    }
}
