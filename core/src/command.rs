use serde::Deserialize;
use serde::Serialize;

use crate::error::ProcessError;
use crate::error::Result;

/// A shell command the agent is asked to run.
///
/// `name` is a human label and need not be unique; `kind` is a free-form
/// classification tag supplied by the client (serialized as `type`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub name: String,
    pub command_line: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl Command {
    pub fn new(name: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_line: command_line.into(),
            kind: String::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ProcessError::InvalidCommand {
                reason: "command name required",
            });
        }
        if self.command_line.trim().is_empty() {
            return Err(ProcessError::InvalidCommand {
                reason: "command line required",
            });
        }
        Ok(())
    }
}
