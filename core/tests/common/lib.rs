use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use anyhow::bail;
use exec_agent_core::DeliveryError;
use exec_agent_core::Event;
use exec_agent_core::EventConsumer;
use exec_agent_core::EventMask;
use exec_agent_core::MachineProcess;
use exec_agent_core::ProcessConfig;
use exec_agent_core::ProcessRegistry;
use exec_agent_core::Subscriber;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry config logging under `logs_dir`, using `/bin/sh` so tests do
/// not depend on bash being installed.
pub fn test_config(logs_dir: &Path) -> ProcessConfig {
    ProcessConfig::default()
        .with_logs_dir(logs_dir)
        .with_shell("/bin/sh")
}

/// Fresh registry with logging enabled, plus the temp dir that backs it.
pub fn logging_registry() -> (TempDir, ProcessRegistry) {
    let tmp = tempfile::tempdir().expect("create logs tempdir");
    let registry = ProcessRegistry::new(test_config(tmp.path()));
    (tmp, registry)
}

/// Registry that keeps no logs.
pub fn logless_registry() -> ProcessRegistry {
    ProcessRegistry::new(ProcessConfig::default().with_shell("/bin/sh"))
}

/// Polls until `pid` is reported dead.
pub async fn wait_for_death(registry: &ProcessRegistry, pid: u64) -> anyhow::Result<MachineProcess> {
    let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
    loop {
        let process = registry.get(pid).await?;
        if !process.alive {
            return Ok(process);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("process {pid} still alive after {DEFAULT_TIMEOUT:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Drains `rx` up to and including the first Died event.
pub async fn collect_until_died(rx: &mut UnboundedReceiver<Event>) -> anyhow::Result<Vec<Event>> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(DEFAULT_TIMEOUT, rx.recv())
            .await
            .context("timed out waiting for process events")?
            .context("event channel closed before process died")?;
        let died = matches!(event, Event::Died { .. });
        events.push(event);
        if died {
            return Ok(events);
        }
    }
}

/// Texts of the stdout events in `events`, in order.
pub fn stdout_texts(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Stdout { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Consumer that keeps every event it accepts. Can be told to start
/// rejecting deliveries.
#[derive(Debug, Default)]
pub struct RecordingConsumer {
    events: Mutex<Vec<Event>>,
    rejecting: Mutex<bool>,
}

impl RecordingConsumer {
    pub fn subscriber(self: &Arc<Self>, id: &str, mask: EventMask) -> Subscriber {
        Subscriber::new(id, mask, Arc::clone(self) as Arc<dyn EventConsumer>)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn reject_from_now_on(&self) {
        *self.rejecting.lock().expect("rejecting lock") = true;
    }
}

impl EventConsumer for RecordingConsumer {
    fn accept(&self, event: Event) -> Result<(), DeliveryError> {
        if *self.rejecting.lock().expect("rejecting lock") {
            return Err(DeliveryError::Closed);
        }
        self.events.lock().expect("events lock").push(event);
        Ok(())
    }
}
