use std::path::Path;
use std::path::PathBuf;

use crate::config::DEFAULT_MAX_DIRS_COUNT;

const LOG_FILE_PREFIX: &str = "pid-";

/// Spreads per-process log files across at most `max_dirs` numbered
/// subdirectories so a long-lived agent never piles every file into one
/// directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogsDistributor {
    max_dirs: u64,
}

impl LogsDistributor {
    pub fn new(max_dirs: u64) -> Self {
        Self {
            max_dirs: max_dirs.max(1),
        }
    }

    pub fn max_dirs(&self) -> u64 {
        self.max_dirs
    }

    pub fn dir_for_pid(&self, base: &Path, pid: u64) -> PathBuf {
        base.join((pid % self.max_dirs).to_string())
    }

    pub fn log_file_for_pid(&self, base: &Path, pid: u64) -> PathBuf {
        self.dir_for_pid(base, pid)
            .join(format!("{LOG_FILE_PREFIX}{pid}"))
    }

    /// Like [`Self::dir_for_pid`] but creates the directory on first use.
    pub async fn ensure_dir_for_pid(&self, base: &Path, pid: u64) -> std::io::Result<PathBuf> {
        let dir = self.dir_for_pid(base, pid);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

impl Default for LogsDistributor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIRS_COUNT)
    }
}
