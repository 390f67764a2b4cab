use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use tokio::fs::File as TokioFile;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;

use crate::error::ProcessError;
use crate::error::Result;
use crate::logs::message::LogMessage;

/// Reads the messages of a log file whose time falls in `[from, till]`.
///
/// Records are written in chronological order, so scanning stops at the
/// first record past `till`.
pub async fn read_logs(
    path: &Path,
    from: DateTime<Utc>,
    till: DateTime<Utc>,
) -> Result<Vec<LogMessage>> {
    let file = TokioFile::open(path)
        .await
        .map_err(|err| ProcessError::read_logs(path, err))?;
    let mut lines = BufReader::new(file).lines();

    let mut messages = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|err| ProcessError::read_logs(path, err))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let message: LogMessage = serde_json::from_str(&line)
            .map_err(|err| ProcessError::read_logs(path, err.into()))?;
        if message.time < from {
            continue;
        }
        if message.time > till {
            break;
        }
        messages.push(message);
    }
    Ok(messages)
}
