use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;

use crate::logs::message::LogKind;
use crate::logs::message::LogMessage;
use crate::pumper::LineConsumer;

/// Appends newline-delimited JSON [`LogMessage`] records to a single
/// process's log file.
///
/// Records are buffered in memory and written once the buffer grows past
/// `flush_threshold`, or on [`FileLogger::flush`] / [`FileLogger::close`].
/// Failures are logged and swallowed: losing a log line must never stall
/// output pumping.
#[derive(Debug)]
pub struct FileLogger {
    path: PathBuf,
    flush_threshold: usize,
    state: Mutex<WriterState>,
}

#[derive(Debug)]
struct WriterState {
    buffer: Vec<u8>,
    file: Option<TokioFile>,
}

impl FileLogger {
    /// Creates (or truncates) the log file at `path`.
    pub async fn create(path: impl Into<PathBuf>, flush_threshold: usize) -> std::io::Result<Self> {
        let path = path.into();
        let file = TokioFile::create(&path).await?;
        Ok(Self {
            path,
            flush_threshold,
            state: Mutex::new(WriterState {
                buffer: Vec::with_capacity(flush_threshold),
                file: Some(file),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, message: &LogMessage) {
        let mut state = self.state.lock().await;
        if state.file.is_none() {
            debug!(path = %self.path.display(), "dropping log line written after close");
            return;
        }
        if let Err(err) = serde_json::to_writer(&mut state.buffer, message) {
            error!(path = %self.path.display(), "failed to encode log message: {err}");
            return;
        }
        state.buffer.push(b'\n');
        if state.buffer.len() > self.flush_threshold {
            self.flush_locked(&mut state).await;
        }
    }

    pub async fn flush(&self) {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await;
    }

    /// Flushes whatever is buffered and releases the file handle.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await;
        state.file = None;
    }

    async fn flush_locked(&self, state: &mut WriterState) {
        if state.buffer.is_empty() {
            return;
        }
        let WriterState { buffer, file } = state;
        if let Some(file) = file.as_mut() {
            let written = match file.write_all(buffer.as_slice()).await {
                Ok(()) => file.flush().await,
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                error!(path = %self.path.display(), "failed to flush process logs: {err}");
            }
        }
        buffer.clear();
    }
}

#[async_trait]
impl LineConsumer for FileLogger {
    async fn on_stdout(&self, line: &str, time: DateTime<Utc>) {
        self.append(&LogMessage::new(LogKind::Stdout, time, line))
            .await;
    }

    async fn on_stderr(&self, line: &str, time: DateTime<Utc>) {
        self.append(&LogMessage::new(LogKind::Stderr, time, line))
            .await;
    }

    async fn close(&self) {
        FileLogger::close(self).await;
    }
}
