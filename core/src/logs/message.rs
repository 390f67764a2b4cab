use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ProcessError;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogKind {
    Stdout,
    Stderr,
}

/// One persisted line of process output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub kind: LogKind,
    pub time: DateTime<Utc>,
    pub text: String,
}

impl LogMessage {
    pub fn new(kind: LogKind, time: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            kind,
            time,
            text: text.into(),
        }
    }
}

/// Parses an RFC 3339 timestamp as supplied by clients (`2017-01-23T10:00:00.123456789+02:00`).
pub fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|time| time.with_timezone(&Utc))
        .map_err(|source| ProcessError::InvalidTime {
            value: value.to_string(),
            source,
        })
}
