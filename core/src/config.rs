use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SHELL: &str = "/bin/bash";
pub const DEFAULT_MAX_DIRS_COUNT: u64 = 16;
pub const DEFAULT_LOG_FLUSH_THRESHOLD: usize = 8 * 1024; // 8 KiB

/// Settings the registry is constructed with. Owned by the host, not by the
/// registry itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Root of the per-process log store; `None` disables persistence.
    pub logs_dir: Option<PathBuf>,
    pub shell: PathBuf,
    pub max_dirs_count: u64,
    pub log_flush_threshold: usize,
    pub cleanup_period: Option<Duration>,
    pub cleanup_threshold: Option<Duration>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            logs_dir: None,
            shell: PathBuf::from(DEFAULT_SHELL),
            max_dirs_count: DEFAULT_MAX_DIRS_COUNT,
            log_flush_threshold: DEFAULT_LOG_FLUSH_THRESHOLD,
            cleanup_period: None,
            cleanup_threshold: None,
        }
    }
}

impl ProcessConfig {
    pub fn with_logs_dir(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = Some(logs_dir.into());
        self
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_cleanup(mut self, period: Duration, threshold: Duration) -> Self {
        self.cleanup_period = Some(period);
        self.cleanup_threshold = Some(threshold);
        self
    }

    /// Both knobs must be set for periodic cleanup to run.
    pub fn cleanup(&self) -> Option<(Duration, Duration)> {
        match (self.cleanup_period, self.cleanup_threshold) {
            (Some(period), Some(threshold)) if !period.is_zero() => Some((period, threshold)),
            _ => None,
        }
    }
}
