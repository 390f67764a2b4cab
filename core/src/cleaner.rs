use std::io::ErrorKind;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::registry::ProcessRegistry;

/// Evicts processes that have been dead for longer than `threshold`,
/// together with their log files.
#[derive(Debug, Clone)]
pub struct Cleaner {
    registry: ProcessRegistry,
    period: Duration,
    threshold: Duration,
}

impl Cleaner {
    pub fn new(registry: ProcessRegistry, period: Duration, threshold: Duration) -> Self {
        Self {
            registry,
            period,
            threshold,
        }
    }

    /// One eviction pass. Returns how many records were removed.
    pub async fn clean_once(&self) -> usize {
        let now = Utc::now();
        let deadline = chrono::Duration::from_std(self.threshold)
            .ok()
            .and_then(|threshold| now.checked_sub_signed(threshold));
        let Some(deadline) = deadline else {
            // Threshold reaches past the representable range; nothing can be that old.
            return 0;
        };

        let evicted = self.registry.evict_dead_before(deadline).await;
        for record in &evicted {
            let Some(path) = &record.log_file else {
                continue;
            };
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(
                    pid = record.pid,
                    path = %path.display(),
                    "failed to remove process log: {err}"
                ),
            }
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicted dead processes");
        }
        evicted.len()
    }

    /// Runs [`Self::clean_once`] every `period` until `cancel` fires.
    pub async fn clean_periodically(self, cancel: CancellationToken) {
        info!(
            period_secs = self.period.as_secs(),
            threshold_secs = self.threshold.as_secs(),
            "process cleaner started"
        );
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.clean_once().await;
                }
            }
        }
        debug!("process cleaner stopped");
    }
}
