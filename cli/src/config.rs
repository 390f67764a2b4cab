use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Args;
use exec_agent_core::DEFAULT_LOG_FLUSH_THRESHOLD;
use exec_agent_core::DEFAULT_MAX_DIRS_COUNT;
use exec_agent_core::DEFAULT_SHELL;
use exec_agent_core::ProcessConfig;
use serde::Deserialize;

const CONFIG_DIR: &str = ".exec-agent";
const CONFIG_FILE: &str = "config.toml";

const DEFAULT_CLEANUP_PERIOD_MINUTES: i64 = 2;
const DEFAULT_CLEANUP_THRESHOLD_MINUTES: i64 = -1;

/// Agent settings as read from `~/.exec-agent/config.toml`.
///
/// Cleanup knobs are whole minutes; a negative value disables cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub logs_dir: Option<PathBuf>,
    pub shell: PathBuf,
    pub max_dirs: u64,
    pub log_flush_threshold: usize,
    pub cleanup_period_minutes: i64,
    pub cleanup_threshold_minutes: i64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            logs_dir: None,
            shell: PathBuf::from(DEFAULT_SHELL),
            max_dirs: DEFAULT_MAX_DIRS_COUNT,
            log_flush_threshold: DEFAULT_LOG_FLUSH_THRESHOLD,
            cleanup_period_minutes: DEFAULT_CLEANUP_PERIOD_MINUTES,
            cleanup_threshold_minutes: DEFAULT_CLEANUP_THRESHOLD_MINUTES,
        }
    }
}

/// Flags that take precedence over the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Root directory for process logs. Logging is off when unset.
    #[arg(long = "logs-dir", value_name = "DIR")]
    pub logs_dir: Option<PathBuf>,

    /// Shell used to run command lines.
    #[arg(long = "shell", value_name = "PATH")]
    pub shell: Option<PathBuf>,

    /// Number of subdirectories log files are spread across.
    #[arg(long = "max-dirs", value_name = "N")]
    pub max_dirs: Option<u64>,

    /// Minutes between cleanup passes; negative disables cleanup.
    #[arg(long = "cleanup-period", value_name = "MINUTES", allow_negative_numbers = true)]
    pub cleanup_period: Option<i64>,

    /// Minutes a process stays listed after death; negative disables cleanup.
    #[arg(long = "cleanup-threshold", value_name = "MINUTES", allow_negative_numbers = true)]
    pub cleanup_threshold: Option<i64>,
}

impl AgentConfig {
    /// Loads `path`, or the default location when `path` is `None`. A missing
    /// default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("invalid config at {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(logs_dir) = &overrides.logs_dir {
            self.logs_dir = Some(logs_dir.clone());
        }
        if let Some(shell) = &overrides.shell {
            self.shell = shell.clone();
        }
        if let Some(max_dirs) = overrides.max_dirs {
            self.max_dirs = max_dirs;
        }
        if let Some(period) = overrides.cleanup_period {
            self.cleanup_period_minutes = period;
        }
        if let Some(threshold) = overrides.cleanup_threshold {
            self.cleanup_threshold_minutes = threshold;
        }
    }

    pub fn to_process_config(&self) -> ProcessConfig {
        ProcessConfig {
            logs_dir: self.logs_dir.clone(),
            shell: self.shell.clone(),
            max_dirs_count: self.max_dirs,
            log_flush_threshold: self.log_flush_threshold,
            cleanup_period: minutes(self.cleanup_period_minutes),
            cleanup_threshold: minutes(self.cleanup_threshold_minutes),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

fn minutes(value: i64) -> Option<Duration> {
    u64::try_from(value)
        .ok()
        .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
}
