use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::warn;

use crate::command::Command;
use crate::event::Event;
use crate::logs::FileLogger;
use crate::logs::LogKind;
use crate::logs::LogMessage;
use crate::pumper::LineConsumer;
use crate::subscriber::Subscriber;

/// Exit code reported while a process is still running.
pub const UNSET_EXIT_CODE: i32 = -1;

// Conventional shell encoding of "killed by signal N".
const EXIT_CODE_SIGNAL_BASE: i32 = 128;

/// Point-in-time view of a process record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineProcess {
    pub pid: u64,
    pub native_pid: u32,
    pub name: String,
    pub command_line: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub alive: bool,
    pub exit_code: i32,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_time: Option<DateTime<Utc>>,
    pub has_logs: bool,
}

/// The registry's record of one process.
///
/// Identity fields never change after start. Everything mutable lives in
/// [`ProcessState`] behind a per-process lock so that unrelated processes
/// never contend.
#[derive(Debug)]
pub(crate) struct ProcessRecord {
    pub(crate) pid: u64,
    pub(crate) native_pid: u32,
    pub(crate) command: Command,
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) log_file: Option<PathBuf>,
    /// Held by the pumper while a line is stamped and dispatched.
    pub(crate) output_gate: Arc<Mutex<()>>,
    pub(crate) state: RwLock<ProcessState>,
}

#[derive(Debug)]
pub(crate) struct ProcessState {
    pub(crate) alive: bool,
    pub(crate) exit_code: i32,
    pub(crate) death_time: Option<DateTime<Utc>>,
    pub(crate) child: Option<Child>,
    pub(crate) logger: Option<Arc<FileLogger>>,
    pub(crate) subscribers: Vec<Subscriber>,
}

impl ProcessRecord {
    pub(crate) fn new(
        pid: u64,
        native_pid: u32,
        command: Command,
        log_file: Option<PathBuf>,
        child: Child,
        logger: Option<Arc<FileLogger>>,
        subscribers: Vec<Subscriber>,
    ) -> Self {
        Self {
            pid,
            native_pid,
            command,
            start_time: Utc::now(),
            log_file,
            output_gate: Arc::new(Mutex::new(())),
            state: RwLock::new(ProcessState {
                alive: true,
                exit_code: UNSET_EXIT_CODE,
                death_time: None,
                child: Some(child),
                logger,
                subscribers,
            }),
        }
    }

    pub(crate) async fn snapshot(&self) -> MachineProcess {
        let state = self.state.read().await;
        self.snapshot_with(&state)
    }

    pub(crate) fn snapshot_with(&self, state: &ProcessState) -> MachineProcess {
        MachineProcess {
            pid: self.pid,
            native_pid: self.native_pid,
            name: self.command.name.clone(),
            command_line: self.command.command_line.clone(),
            kind: self.command.kind.clone(),
            alive: state.alive,
            exit_code: state.exit_code,
            start_time: self.start_time,
            death_time: state.death_time,
            has_logs: self.log_file.is_some(),
        }
    }

    pub(crate) fn started_event(&self) -> Event {
        Event::Started {
            time: self.start_time,
            pid: self.pid,
            native_pid: self.native_pid,
            name: self.command.name.clone(),
            command_line: self.command.command_line.clone(),
        }
    }

    pub(crate) fn died_event(&self, state: &ProcessState) -> Event {
        Event::Died {
            time: state.death_time.unwrap_or_else(Utc::now),
            pid: self.pid,
            native_pid: self.native_pid,
            name: self.command.name.clone(),
            command_line: self.command.command_line.clone(),
            exit_code: state.exit_code,
        }
    }

    pub(crate) fn output_event(&self, message: LogMessage) -> Event {
        let LogMessage { kind, time, text } = message;
        match kind {
            LogKind::Stdout => Event::Stdout {
                time,
                pid: self.pid,
                text,
            },
            LogKind::Stderr => Event::Stderr {
                time,
                pid: self.pid,
                text,
            },
        }
    }

    /// Offers `event` to every interested subscriber. Subscribers whose
    /// consumer rejects it are dropped once the read lock is released.
    pub(crate) async fn publish(&self, event: Event) {
        let mut failed = Vec::new();
        {
            let state = self.state.read().await;
            for subscriber in state.subscribers.iter().filter(|s| s.wants(&event)) {
                if let Err(err) = subscriber.consumer.accept(event.clone()) {
                    debug!(
                        pid = self.pid,
                        subscriber = %subscriber.id,
                        "unsubscribing after failed delivery: {err}"
                    );
                    failed.push(subscriber.id.clone());
                }
            }
        }
        if !failed.is_empty() {
            let mut state = self.state.write().await;
            state
                .subscribers
                .retain(|subscriber| !failed.contains(&subscriber.id));
        }
    }

    /// Death bookkeeping, run once both output streams are exhausted.
    async fn finish(&self) {
        let child = self.state.write().await.child.take();
        let exit_code = match child {
            Some(mut child) => match child.wait().await {
                Ok(status) => decode_exit_status(status),
                Err(err) => {
                    warn!(pid = self.pid, "failed to wait for process exit: {err}");
                    UNSET_EXIT_CODE
                }
            },
            None => UNSET_EXIT_CODE,
        };

        let died = {
            let mut state = self.state.write().await;
            state.alive = false;
            state.exit_code = exit_code;
            state.death_time = Some(Utc::now());
            state.logger = None;
            self.died_event(&state)
        };
        debug!(pid = self.pid, exit_code, "process died");

        self.publish(died).await;
        self.state.write().await.subscribers.clear();
    }
}

#[async_trait]
impl LineConsumer for ProcessRecord {
    async fn on_stdout(&self, line: &str, time: DateTime<Utc>) {
        self.publish(Event::Stdout {
            time,
            pid: self.pid,
            text: line.to_string(),
        })
        .await;
    }

    async fn on_stderr(&self, line: &str, time: DateTime<Utc>) {
        self.publish(Event::Stderr {
            time,
            pid: self.pid,
            text: line.to_string(),
        })
        .await;
    }

    async fn close(&self) {
        self.finish().await;
    }
}

pub(crate) fn decode_exit_status(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_CODE_SIGNAL_BASE + signal;
        }
    }
    UNSET_EXIT_CODE
}
