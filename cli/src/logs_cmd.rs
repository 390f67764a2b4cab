use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;
use clap::Parser;
use exec_agent_core::logs::LogsDistributor;
use exec_agent_core::logs::parse_time;
use exec_agent_core::logs::read_logs;

use crate::config::AgentConfig;

/// Print a process's persisted output log as JSON lines.
#[derive(Debug, Parser)]
pub struct LogsCli {
    /// Root directory for process logs; defaults to the configured one.
    #[arg(long = "logs-dir", value_name = "DIR")]
    pub logs_dir: Option<PathBuf>,

    /// Agent-assigned process id.
    #[arg(long = "pid", value_name = "PID")]
    pub pid: u64,

    /// Only messages at or after this RFC 3339 time.
    #[arg(long = "from", value_name = "RFC3339")]
    pub from: Option<String>,

    /// Only messages at or before this RFC 3339 time.
    #[arg(long = "till", value_name = "RFC3339")]
    pub till: Option<String>,

    /// Number of subdirectories the logs were spread across.
    #[arg(long = "max-dirs", value_name = "N")]
    pub max_dirs: Option<u64>,
}

pub async fn run(cli: LogsCli, config_path: Option<&Path>) -> Result<()> {
    let config = AgentConfig::load(config_path)?;
    let Some(logs_dir) = cli.logs_dir.or(config.logs_dir) else {
        anyhow::bail!("no logs directory configured; pass --logs-dir");
    };
    let distributor = LogsDistributor::new(cli.max_dirs.unwrap_or(config.max_dirs));
    let path = distributor.log_file_for_pid(&logs_dir, cli.pid);

    let from = parse_bound(cli.from.as_deref(), DateTime::<Utc>::MIN_UTC)?;
    let till = parse_bound(cli.till.as_deref(), Utc::now())?;
    let messages = read_logs(&path, from, till)
        .await
        .with_context(|| format!("failed to read logs for process {}", cli.pid))?;

    let mut stdout = std::io::stdout().lock();
    for message in &messages {
        serde_json::to_writer(&mut stdout, message)?;
        writeln!(stdout)?;
    }
    stdout.flush()?;
    Ok(())
}

fn parse_bound(value: Option<&str>, default: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match value {
        Some(value) => Ok(parse_time(value)?),
        None => Ok(default),
    }
}
