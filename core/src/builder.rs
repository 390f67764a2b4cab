use crate::command::Command;
use crate::error::Result;
use crate::process::MachineProcess;
use crate::registry::ProcessRegistry;
use crate::subscriber::Subscriber;

/// Fluent front end for [`ProcessRegistry::start`].
#[derive(Debug, Default, Clone)]
pub struct ProcessBuilder {
    command: Command,
    subscribers: Vec<Subscriber>,
}

impl ProcessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cmd(mut self, command: Command) -> Self {
        self.command = command;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.command.name = name.into();
        self
    }

    pub fn command_line(mut self, command_line: impl Into<String>) -> Self {
        self.command.command_line = command_line.into();
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.command.kind = kind.into();
        self
    }

    /// Subscriber that receives every event before any other subscriber.
    pub fn first_subscriber(mut self, subscriber: Subscriber) -> Self {
        self.subscribers.insert(0, subscriber);
        self
    }

    pub fn subscriber(mut self, subscriber: Subscriber) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn subscribers(mut self, subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    pub async fn start(self, registry: &ProcessRegistry) -> Result<MachineProcess> {
        registry.start(self.command, self.subscribers).await
    }
}
