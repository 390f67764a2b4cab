use std::fmt;
use std::ops::BitOr;
use std::ops::BitOrAssign;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ProcessError;
use crate::error::Result;

pub const STDOUT_EVENT_TYPE: &str = "stdout";
pub const STDERR_EVENT_TYPE: &str = "stderr";
pub const STATUS_EVENT_TYPE: &str = "process_status";

/// Bitwise set of the event categories a subscriber is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMask(u64);

impl EventMask {
    pub const NONE: Self = Self(0);
    pub const STDOUT: Self = Self(1);
    pub const STDERR: Self = Self(1 << 1);
    pub const STATUS: Self = Self(1 << 2);
    pub const DEFAULT: Self = Self(Self::STDOUT.0 | Self::STDERR.0 | Self::STATUS.0);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parses a comma separated list such as `"stdout,process_status"`.
    ///
    /// An empty list means every event type.
    pub fn from_types(types: &str) -> Result<Self> {
        let mut mask = Self::NONE;
        for raw in types.split(',') {
            let ty = raw.trim();
            if ty.is_empty() {
                continue;
            }
            mask |= match ty.to_ascii_lowercase().as_str() {
                STDOUT_EVENT_TYPE => Self::STDOUT,
                STDERR_EVENT_TYPE => Self::STDERR,
                STATUS_EVENT_TYPE => Self::STATUS,
                _ => {
                    return Err(ProcessError::InvalidEventType {
                        value: ty.to_string(),
                    });
                }
            };
        }
        if mask.is_empty() {
            Ok(Self::DEFAULT)
        } else {
            Ok(mask)
        }
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::with_capacity(3);
        if self.contains(Self::STDOUT) {
            names.push(STDOUT_EVENT_TYPE);
        }
        if self.contains(Self::STDERR) {
            names.push(STDERR_EVENT_TYPE);
        }
        if self.contains(Self::STATUS) {
            names.push(STATUS_EVENT_TYPE);
        }
        write!(f, "{}", names.join(","))
    }
}

/// Lifecycle and output notifications published for a single process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "process_started", rename_all = "camelCase")]
    Started {
        time: DateTime<Utc>,
        pid: u64,
        native_pid: u32,
        name: String,
        command_line: String,
    },
    #[serde(rename = "process_died", rename_all = "camelCase")]
    Died {
        time: DateTime<Utc>,
        pid: u64,
        native_pid: u32,
        name: String,
        command_line: String,
        exit_code: i32,
    },
    #[serde(rename = "process_stdout", rename_all = "camelCase")]
    Stdout {
        time: DateTime<Utc>,
        pid: u64,
        text: String,
    },
    #[serde(rename = "process_stderr", rename_all = "camelCase")]
    Stderr {
        time: DateTime<Utc>,
        pid: u64,
        text: String,
    },
}

impl Event {
    pub fn mask_bit(&self) -> EventMask {
        match self {
            Self::Started { .. } | Self::Died { .. } => EventMask::STATUS,
            Self::Stdout { .. } => EventMask::STDOUT,
            Self::Stderr { .. } => EventMask::STDERR,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Started { time, .. }
            | Self::Died { time, .. }
            | Self::Stdout { time, .. }
            | Self::Stderr { time, .. } => *time,
        }
    }

    pub fn pid(&self) -> u64 {
        match self {
            Self::Started { pid, .. }
            | Self::Died { pid, .. }
            | Self::Stdout { pid, .. }
            | Self::Stderr { pid, .. } => *pid,
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Self::Stdout { .. } | Self::Stderr { .. })
    }
}
