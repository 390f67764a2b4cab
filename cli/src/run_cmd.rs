use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use exec_agent_core::Event;
use exec_agent_core::EventMask;
use exec_agent_core::ProcessBuilder;
use exec_agent_core::ProcessRegistry;
use exec_agent_core::Subscriber;
use tracing::info;
use tracing::warn;

use crate::config::AgentConfig;
use crate::config::ConfigOverrides;

const SUBSCRIBER_ID: &str = "exec-agent-cli";

/// Run a command under supervision and stream its events as JSON lines.
#[derive(Debug, Parser)]
pub struct RunCli {
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Process name reported in events.
    #[arg(long = "name", value_name = "NAME", default_value = "command")]
    pub name: String,

    /// Free-form command type.
    #[arg(long = "type", value_name = "TYPE", default_value = "")]
    pub kind: String,

    /// Comma-separated event types to print (stdout, stderr, process_status).
    #[arg(long = "mask", value_name = "TYPES", default_value = "")]
    pub mask: String,

    /// Remove the logs directory before starting.
    #[arg(long = "clean-logs", default_value_t = false)]
    pub clean_logs: bool,

    /// Command line handed to the shell.
    #[arg(value_name = "COMMAND", trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

/// Returns the exit code of the supervised process.
pub async fn run(cli: RunCli, config_path: Option<&Path>) -> Result<i32> {
    let mut config = AgentConfig::load(config_path)?;
    config.apply(&cli.overrides);
    let print_mask = EventMask::from_types(&cli.mask)?;

    if cli.clean_logs
        && let Some(logs_dir) = &config.logs_dir
    {
        clean_logs_dir(logs_dir).await?;
    }

    let registry = ProcessRegistry::new(config.to_process_config());
    registry.spawn_cleaner();

    // Status events are always needed to learn when to stop.
    let (subscriber, mut rx) = Subscriber::channel(SUBSCRIBER_ID, print_mask | EventMask::STATUS);
    let process = ProcessBuilder::new()
        .name(cli.name)
        .kind(cli.kind)
        .command_line(cli.command.join(" "))
        .first_subscriber(subscriber)
        .start(&registry)
        .await
        .context("failed to start command")?;
    info!(pid = process.pid, "supervising command");

    let mut exit_code = None;
    let mut interrupted = false;
    while exit_code.is_none() {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                if let Event::Died { exit_code: code, .. } = &event {
                    exit_code = Some(*code);
                }
                if print_mask.contains(event.mask_bit()) {
                    print_event(&event)?;
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if let Err(err) = registry.kill(process.pid).await {
                    warn!(pid = process.pid, "failed to kill on interrupt: {err}");
                }
            }
        }
    }

    let exit_code = match exit_code {
        Some(code) => code,
        None => registry.get(process.pid).await?.exit_code,
    };
    registry.shutdown().await;
    Ok(exit_code)
}

fn print_event(event: &Event) -> Result<()> {
    let line = serde_json::to_string(event)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

async fn clean_logs_dir(logs_dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(logs_dir).await {
        Ok(()) => {
            info!(path = %logs_dir.display(), "removed previous process logs");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err)
            .with_context(|| format!("failed to clean logs at {}", logs_dir.display())),
    }
}
