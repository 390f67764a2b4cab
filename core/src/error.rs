use std::path::PathBuf;

use thiserror::Error;

use crate::subscriber::DeliveryError;

pub type Result<T> = std::result::Result<T, ProcessError>;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process with id '{pid}' does not exist")]
    NoProcess { pid: u64 },
    #[error("process with id '{pid}' is not alive")]
    NotAlive { pid: u64 },
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: &'static str },
    #[error("invalid time '{value}': {source}")]
    InvalidTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("unknown event type '{value}'")]
    InvalidEventType { value: String },
    #[error("subscriber with id '{id}' already exists for process '{pid}'")]
    DuplicateSubscriber { pid: u64, id: String },
    #[error("subscriber with id '{id}' does not exist for process '{pid}'")]
    NoSubscriber { pid: u64, id: String },
    #[error("can't subscribe to process '{pid}': {reason}")]
    Subscribe { pid: u64, reason: &'static str },
    #[error("logs are not available for process '{pid}'")]
    LogsUnavailable { pid: u64 },
    #[error("failed to start process: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to signal process '{pid}': {source}")]
    Signal {
        pid: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create log file {}: {source}", path.display())]
    CreateLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read logs from {}: {source}", path.display())]
    ReadLogs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to deliver event to subscriber '{id}': {source}")]
    Delivery {
        id: String,
        #[source]
        source: DeliveryError,
    },
}

impl ProcessError {
    pub(crate) fn spawn(source: std::io::Error) -> Self {
        Self::Spawn { source }
    }

    pub(crate) fn create_log(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateLog {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn read_logs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadLogs {
            path: path.into(),
            source,
        }
    }

    /// Whether callers should surface this as a "not found" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoProcess { .. })
    }

    /// Whether callers should surface this as a "conflict" condition.
    pub fn is_not_alive(&self) -> bool {
        matches!(self, Self::NotAlive { .. })
    }
}
