use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use chrono::DateTime;
use chrono::Utc;
use tokio::process::Child;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::cleaner::Cleaner;
use crate::command::Command;
use crate::config::ProcessConfig;
use crate::error::ProcessError;
use crate::error::Result;
use crate::event::EventMask;
use crate::logs::FileLogger;
use crate::logs::LogMessage;
use crate::logs::LogsDistributor;
use crate::logs::parse_time;
use crate::logs::read_logs;
use crate::process::MachineProcess;
use crate::process::ProcessRecord;
use crate::pumper::OutputPumper;
use crate::subscriber::Subscriber;

/// Owner of every process the agent has started and not yet evicted.
///
/// Cloning is cheap; clones share the same map.
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    config: ProcessConfig,
    distributor: LogsDistributor,
    next_pid: AtomicU64,
    processes: RwLock<HashMap<u64, Arc<ProcessRecord>>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl ProcessRegistry {
    pub fn new(config: ProcessConfig) -> Self {
        let distributor = LogsDistributor::new(config.max_dirs_count);
        Self {
            inner: Arc::new(RegistryInner {
                config,
                distributor,
                next_pid: AtomicU64::new(0),
                processes: RwLock::new(HashMap::new()),
                tasks: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.inner.config
    }

    /// Spawns `command` and returns once it is registered and its Started
    /// event has been delivered to `subscribers`.
    pub async fn start(
        &self,
        command: Command,
        subscribers: Vec<Subscriber>,
    ) -> Result<MachineProcess> {
        command.validate()?;

        let pid = self.inner.next_pid.fetch_add(1, Ordering::SeqCst) + 1;
        ensure_unique_ids(pid, &subscribers)?;

        let (log_file, logger) = match &self.inner.config.logs_dir {
            Some(base) => {
                let path = self.open_log_dir(base, pid).await?;
                let logger = FileLogger::create(&path, self.inner.config.log_flush_threshold)
                    .await
                    .map_err(|err| ProcessError::create_log(&path, err))?;
                (Some(path), Some(Arc::new(logger)))
            }
            None => (None, None),
        };

        let mut child = match spawn_shell(&self.inner.config.shell, &command.command_line) {
            Ok(child) => child,
            Err(err) => {
                if let Some(path) = &log_file {
                    let _ = tokio::fs::remove_file(path).await;
                }
                return Err(ProcessError::spawn(err));
            }
        };
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.start_kill();
            return Err(ProcessError::spawn(std::io::Error::other(
                "process output pipes were not available",
            )));
        };
        // A missing id means the child was already reaped; a zero pid would
        // make the group kill hit the agent itself.
        let Some(native_pid) = child.id() else {
            if let Some(path) = &log_file {
                let _ = tokio::fs::remove_file(path).await;
            }
            return Err(ProcessError::spawn(std::io::Error::other(
                "spawned process has no native pid",
            )));
        };

        let record = Arc::new(ProcessRecord::new(
            pid,
            native_pid,
            command,
            log_file,
            child,
            logger.clone(),
            subscribers,
        ));
        self.inner
            .processes
            .write()
            .await
            .insert(pid, Arc::clone(&record));

        record.publish(record.started_event()).await;
        let snapshot = record.snapshot().await;

        let mut pumper =
            OutputPumper::new(stdout, stderr).with_gate(Arc::clone(&record.output_gate));
        if let Some(logger) = logger {
            pumper.add_consumer(logger);
        }
        pumper.add_consumer(record);
        self.inner.tasks.spawn(pumper.pump());

        info!(
            pid,
            native_pid,
            name = %snapshot.name,
            "started process"
        );
        Ok(snapshot)
    }

    pub async fn get(&self, pid: u64) -> Result<MachineProcess> {
        Ok(self.record(pid).await?.snapshot().await)
    }

    /// Every known process when `all` is set, otherwise only the alive ones.
    pub async fn processes(&self, all: bool) -> Vec<MachineProcess> {
        let records: Vec<Arc<ProcessRecord>> =
            self.inner.processes.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(records.len());
        for record in records {
            let snapshot = record.snapshot().await;
            if all || snapshot.alive {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by_key(|process| process.pid);
        snapshots
    }

    /// Sends SIGKILL to the process group. Death is recorded later, once the
    /// process has actually exited.
    pub async fn kill(&self, pid: u64) -> Result<()> {
        let record = self.record(pid).await?;
        let mut state = record.state.write().await;
        if !state.alive {
            return Err(ProcessError::NotAlive { pid });
        }
        kill_process_group(record.native_pid, state.child.as_mut())
            .map_err(|source| ProcessError::Signal { pid, source })?;
        debug!(pid, native_pid = record.native_pid, "sent kill signal");
        Ok(())
    }

    pub async fn add_subscriber(&self, pid: u64, subscriber: Subscriber) -> Result<()> {
        let record = self.record(pid).await?;
        let mut state = record.state.write().await;
        if !state.alive && record.native_pid != 0 {
            return Err(ProcessError::Subscribe {
                pid,
                reason: "process is dead",
            });
        }
        if state.subscribers.iter().any(|s| s.id == subscriber.id) {
            return Err(ProcessError::DuplicateSubscriber {
                pid,
                id: subscriber.id,
            });
        }
        state.subscribers.push(subscriber);
        Ok(())
    }

    pub async fn remove_subscriber(&self, pid: u64, id: &str) -> Result<()> {
        let record = self.record(pid).await?;
        record
            .state
            .write()
            .await
            .subscribers
            .retain(|subscriber| subscriber.id != id);
        Ok(())
    }

    pub async fn update_subscriber(&self, pid: u64, id: &str, mask: EventMask) -> Result<()> {
        let record = self.record(pid).await?;
        let mut state = record.state.write().await;
        match state.subscribers.iter_mut().find(|s| s.id == id) {
            Some(subscriber) => {
                subscriber.mask = mask;
                Ok(())
            }
            None => Err(ProcessError::NoSubscriber {
                pid,
                id: id.to_string(),
            }),
        }
    }

    /// Replays the output logged after `after` to `subscriber` and, if the
    /// process is still alive, subscribes it to everything that follows.
    ///
    /// The replay and the registration happen while no output line can be
    /// dispatched, so the subscriber sees every line exactly once. For a dead
    /// process the replay ends with a Died event and nothing is registered.
    pub async fn restore_subscriber(
        &self,
        pid: u64,
        subscriber: Subscriber,
        after: DateTime<Utc>,
    ) -> Result<()> {
        let record = self.record(pid).await?;
        let Some(path) = record.log_file.clone() else {
            return Err(ProcessError::LogsUnavailable { pid });
        };

        let _gate = record.output_gate.lock().await;
        let mut state = record.state.write().await;
        if let Some(logger) = &state.logger {
            logger.flush().await;
        }
        let messages = read_logs(&path, after, Utc::now()).await?;

        if state.alive {
            if state.subscribers.iter().any(|s| s.id == subscriber.id) {
                return Err(ProcessError::DuplicateSubscriber {
                    pid,
                    id: subscriber.id,
                });
            }
            state.subscribers.push(subscriber.clone());
        }

        let replay = messages
            .into_iter()
            .filter(|message| message.time > after)
            .map(|message| record.output_event(message));
        for event in replay {
            if !subscriber.wants(&event) {
                continue;
            }
            if let Err(source) = subscriber.consumer.accept(event) {
                state.subscribers.retain(|s| s.id != subscriber.id);
                return Err(ProcessError::Delivery {
                    id: subscriber.id,
                    source,
                });
            }
        }

        if !state.alive {
            let died = record.died_event(&state);
            if subscriber.wants(&died) {
                subscriber
                    .consumer
                    .accept(died)
                    .map_err(|source| ProcessError::Delivery {
                        id: subscriber.id.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    /// [`Self::restore_subscriber`] with an RFC 3339 `after` as sent by clients.
    pub async fn restore_subscriber_str(
        &self,
        pid: u64,
        subscriber: Subscriber,
        after: &str,
    ) -> Result<()> {
        let after = parse_time(after)?;
        self.restore_subscriber(pid, subscriber, after).await
    }

    /// Messages logged in `[from, till]`, in the order they were written.
    pub async fn read_logs(
        &self,
        pid: u64,
        from: DateTime<Utc>,
        till: DateTime<Utc>,
    ) -> Result<Vec<LogMessage>> {
        let record = self.record(pid).await?;
        let Some(path) = record.log_file.clone() else {
            return Err(ProcessError::LogsUnavailable { pid });
        };
        let logger = record.state.read().await.logger.clone();
        if let Some(logger) = logger {
            logger.flush().await;
        }
        read_logs(&path, from, till).await
    }

    pub async fn read_logs_str(&self, pid: u64, from: &str, till: &str) -> Result<Vec<LogMessage>> {
        let from = parse_time(from)?;
        let till = parse_time(till)?;
        self.read_logs(pid, from, till).await
    }

    pub async fn read_all_logs(&self, pid: u64) -> Result<Vec<LogMessage>> {
        self.read_logs(pid, DateTime::<Utc>::MIN_UTC, Utc::now())
            .await
    }

    /// Starts the periodic cleaner if both cleanup knobs are configured.
    pub fn spawn_cleaner(&self) -> bool {
        let Some((period, threshold)) = self.inner.config.cleanup() else {
            debug!("process cleanup disabled");
            return false;
        };
        let cleaner = Cleaner::new(self.clone(), period, threshold);
        self.inner
            .tasks
            .spawn(cleaner.clean_periodically(self.inner.shutdown.child_token()));
        true
    }

    /// Stops the cleaner, kills every alive process and waits for all
    /// background tasks to finish.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        for process in self.processes(false).await {
            match self.kill(process.pid).await {
                Ok(()) | Err(ProcessError::NotAlive { .. }) => {}
                Err(err) => warn!(pid = process.pid, "failed to kill process on shutdown: {err}"),
            }
        }
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }

    /// Removes dead records whose death precedes `deadline`.
    ///
    /// Record state is inspected without the map lock held. Death is final,
    /// so a record found stale stays stale; the write lock only re-checks
    /// that the map still holds that same record.
    pub(crate) async fn evict_dead_before(
        &self,
        deadline: DateTime<Utc>,
    ) -> Vec<Arc<ProcessRecord>> {
        let records: Vec<Arc<ProcessRecord>> =
            self.inner.processes.read().await.values().cloned().collect();

        let mut stale = Vec::new();
        for record in records {
            let state = record.state.read().await;
            if !state.alive && state.death_time.is_some_and(|time| time < deadline) {
                drop(state);
                stale.push(record);
            }
        }
        if stale.is_empty() {
            return stale;
        }

        let mut processes = self.inner.processes.write().await;
        stale.retain(|record| {
            let current = processes.get(&record.pid);
            if current.is_some_and(|current| Arc::ptr_eq(current, record)) {
                processes.remove(&record.pid);
                true
            } else {
                false
            }
        });
        stale
    }

    async fn record(&self, pid: u64) -> Result<Arc<ProcessRecord>> {
        self.inner
            .processes
            .read()
            .await
            .get(&pid)
            .cloned()
            .ok_or(ProcessError::NoProcess { pid })
    }

    async fn open_log_dir(&self, base: &Path, pid: u64) -> Result<PathBuf> {
        let distributor = self.inner.distributor;
        distributor
            .ensure_dir_for_pid(base, pid)
            .await
            .map_err(|err| ProcessError::create_log(distributor.dir_for_pid(base, pid), err))?;
        Ok(distributor.log_file_for_pid(base, pid))
    }
}

fn ensure_unique_ids(pid: u64, subscribers: &[Subscriber]) -> Result<()> {
    let mut seen = HashSet::with_capacity(subscribers.len());
    for subscriber in subscribers {
        if !seen.insert(subscriber.id.as_str()) {
            return Err(ProcessError::DuplicateSubscriber {
                pid,
                id: subscriber.id.clone(),
            });
        }
    }
    Ok(())
}

fn spawn_shell(shell: &Path, command_line: &str) -> std::io::Result<Child> {
    let mut command = std::process::Command::new(shell);
    command
        .arg("-c")
        .arg(command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own process group, so a kill reaches everything the shell spawned.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    tokio::process::Command::from(command).spawn()
}

#[cfg(unix)]
fn kill_process_group(native_pid: u32, _child: Option<&mut Child>) -> std::io::Result<()> {
    // kill(0) and kill(-1) address the caller's own group and every process.
    let pgid = libc::pid_t::try_from(native_pid)
        .ok()
        .filter(|pgid| *pgid > 1)
        .ok_or_else(|| std::io::Error::other(format!("invalid native pid {native_pid}")))?;
    // SAFETY: kill(2) only takes plain integers.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn kill_process_group(_native_pid: u32, child: Option<&mut Child>) -> std::io::Result<()> {
    match child {
        Some(child) => child.start_kill(),
        None => Err(std::io::Error::other("process is already exiting")),
    }
}
