//! Background replay of the offline queue.
//!
//! The loop is either idle or draining. Each tick of a fixed interval tries to
//! start a drain; a tick that arrives while a drain is still running is a
//! no-op. A drain snapshots the queue, dispatches every action oldest first,
//! then settles the results back into the live queue in one step.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use karma_core::{AppConfig, KeyValueStore, OfflineQueue};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::remote::{Operation, RemoteEndpoint};

/// Default time between drains.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Sync loop configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Time between drains (default: 30s).
    pub interval: Duration,
    /// Failed attempts after which an action is dropped (default: 3).
    pub max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_SYNC_INTERVAL, max_retries: karma_core::queue::DEFAULT_MAX_RETRIES }
    }
}

impl From<&AppConfig> for SyncConfig {
    fn from(config: &AppConfig) -> Self {
        Self { interval: config.sync_interval(), max_retries: config.max_retries }
    }
}

/// Counts for one completed drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions in the snapshot.
    pub attempted: usize,
    /// Actions delivered and removed.
    pub succeeded: usize,
    /// Failed actions kept for the next drain.
    pub retried: usize,
    /// Actions removed without delivery.
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain was already running.
    Skipped,
    Completed(DrainReport),
}

/// Clears the draining flag when dropped, including on cancellation.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic drain of an [`OfflineQueue`] into a [`RemoteEndpoint`].
pub struct SyncLoop<S: KeyValueStore, R: RemoteEndpoint> {
    queue: Arc<OfflineQueue<S>>,
    remote: Arc<R>,
    config: SyncConfig,
    draining: AtomicBool,
    task: Mutex<Option<RunningTask>>,
}

impl<S: KeyValueStore, R: RemoteEndpoint> SyncLoop<S, R> {
    pub fn new(queue: Arc<OfflineQueue<S>>, remote: Arc<R>, config: SyncConfig) -> Self {
        Self { queue, remote, config, draining: AtomicBool::new(false), task: Mutex::new(None) }
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Whether the background task is running.
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Run one drain pass now.
    pub async fn drain(&self) -> DrainOutcome {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            tracing::debug!("drain already in progress, skipping");
            return DrainOutcome::Skipped;
        };

        let actions = self.queue.snapshot().await;
        if actions.is_empty() {
            return DrainOutcome::Completed(DrainReport::default());
        }

        tracing::info!(pending = actions.len(), "draining offline queue");

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut dropped = Vec::new();

        for action in &actions {
            let operation = match action.action.parse::<Operation>() {
                Ok(op) if op.is_queueable() => op,
                _ => {
                    tracing::error!(
                        id = %action.id,
                        action = %action.action,
                        "no replay route for offline action, dropping"
                    );
                    dropped.push(action.id.clone());
                    continue;
                }
            };

            match self.remote.call(operation, &action.data).await {
                Ok(resp) if resp.success => {
                    tracing::debug!(id = %action.id, %operation, "offline action synced");
                    succeeded.push(action.id.clone());
                }
                Ok(resp) => {
                    tracing::warn!(id = %action.id, %operation, reason = %resp.reason(), "offline action rejected");
                    failed.push(action.id.clone());
                }
                Err(error) if !error.is_retryable() => {
                    tracing::error!(id = %action.id, %operation, %error, "offline action can never be sent, dropping");
                    dropped.push(action.id.clone());
                }
                Err(error) => {
                    tracing::warn!(id = %action.id, %operation, %error, "offline action failed");
                    failed.push(action.id.clone());
                }
            }
        }

        let settled = self
            .queue
            .settle(&succeeded, &failed, &dropped, self.config.max_retries)
            .await;

        let report = DrainReport {
            attempted: actions.len(),
            succeeded: settled.completed,
            retried: settled.retained,
            dropped: settled.dropped,
        };

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            retried = report.retried,
            dropped = report.dropped,
            "offline queue drain complete"
        );

        DrainOutcome::Completed(report)
    }
}

impl<S, R> SyncLoop<S, R>
where
    S: KeyValueStore + 'static,
    R: RemoteEndpoint + 'static,
{
    /// Spawn the periodic drain task. The first drain happens one interval
    /// after the call. No-op if already running.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            tracing::debug!("sync loop already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run(shutdown_rx).await });

        *task = Some(RunningTask { shutdown, handle });
    }

    /// Signal the task to exit and wait for it. A drain in flight finishes first.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };

        let _ = task.shutdown.send(true);
        if let Err(error) = task.handle.await {
            tracing::warn!(%error, "sync task ended abnormally");
        }
    }

    async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let period = self.config.interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_ms = period.as_millis() as u64, "sync loop started");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.drain().await;
                }
            }
        }

        tracing::info!("sync loop stopped");
    }
}
