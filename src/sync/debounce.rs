//! Trailing debounce for background persistence
//!
//! Every change notification pushes the deadline out by one quiet period.
//! When the deadline passes without a new change, one flush is spawned as
//! its own task, so a hung adapter call stalls that flush and nothing else.
//! Shutdown waits for every spawned flush before returning.
//! Failures on this path are logged and dropped; the next flush retries with
//! whatever the registry holds by then.

use super::flush::write_all;
use crate::memory::PersistenceAdapter;
use crate::state::{StateRegistry, SubscriptionId};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Quiet period used when none is configured
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy)]
enum SchedulerCommand {
    Changed,
    Cancel,
}

#[derive(Debug, Default)]
struct SchedulerStats {
    flushes: AtomicU64,
    failed_writes: AtomicU64,
    pending: AtomicBool,
}

/// Cheap handle used by registry observers to report changes
#[derive(Clone)]
pub struct DebounceHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
    stats: Arc<SchedulerStats>,
}

impl DebounceHandle {
    /// Report a change. May be called arbitrarily often.
    pub fn notify_changed(&self) {
        self.stats.pending.store(true, Ordering::SeqCst);
        if self.tx.send(SchedulerCommand::Changed).is_err() {
            tracing::debug!("Debounce scheduler stopped; change notification dropped");
        }
    }

    /// Drop the pending deadline without flushing
    pub fn cancel_pending(&self) {
        self.stats.pending.store(false, Ordering::SeqCst);
        let _ = self.tx.send(SchedulerCommand::Cancel);
    }
}

pub struct DebounceScheduler {
    handle: DebounceHandle,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    quiet_period: Duration,
}

impl DebounceScheduler {
    /// Start the scheduler loop. Must be called inside a tokio runtime.
    pub fn start(
        adapter: Arc<dyn PersistenceAdapter>,
        registry: StateRegistry,
        quiet_period: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(SchedulerStats::default());
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(Self::run(
            adapter,
            registry,
            quiet_period,
            rx,
            shutdown.clone(),
            Arc::clone(&stats),
        ));

        Self {
            handle: DebounceHandle { tx, stats },
            shutdown,
            task: Mutex::new(Some(task)),
            quiet_period,
        }
    }

    /// Subscribe to the registry so every mutation schedules a flush
    pub fn attach(&self, registry: &StateRegistry) -> SubscriptionId {
        let handle = self.handle.clone();
        registry.subscribe(move |_| handle.notify_changed())
    }

    pub fn handle(&self) -> DebounceHandle {
        self.handle.clone()
    }

    pub fn notify_changed(&self) {
        self.handle.notify_changed();
    }

    /// Drop the pending deadline without flushing
    pub fn cancel_pending(&self) {
        self.handle.cancel_pending();
    }

    /// Number of flushes fired so far
    pub fn flush_count(&self) -> u64 {
        self.handle.stats.flushes.load(Ordering::SeqCst)
    }

    /// Collection writes that failed across all flushes
    pub fn failed_write_count(&self) -> u64 {
        self.handle.stats.failed_writes.load(Ordering::SeqCst)
    }

    /// Whether a change is waiting for its quiet period to elapse
    pub fn is_pending(&self) -> bool {
        self.handle.stats.pending.load(Ordering::SeqCst)
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Stop the loop. Flushes already in flight are awaited, then a pending
    /// change is flushed once before returning.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Debounce scheduler task ended abnormally: {}", e);
            }
        }
    }

    async fn run(
        adapter: Arc<dyn PersistenceAdapter>,
        registry: StateRegistry,
        quiet_period: Duration,
        mut rx: mpsc::UnboundedReceiver<SchedulerCommand>,
        shutdown: CancellationToken,
        stats: Arc<SchedulerStats>,
    ) {
        let mut deadline: Option<Instant> = None;
        let in_flight = TaskTracker::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    in_flight.close();
                    if !in_flight.is_empty() {
                        tracing::debug!("Waiting for {} in-flight flushes", in_flight.len());
                    }
                    in_flight.wait().await;

                    // The flag also covers changes still queued in the channel
                    if deadline.is_some() || stats.pending.load(Ordering::SeqCst) {
                        tracing::debug!("Flushing pending changes before shutdown");
                        Self::flush(&adapter, &registry, &stats).await;
                    }
                    break;
                }

                command = rx.recv() => match command {
                    Some(SchedulerCommand::Changed) => {
                        deadline = Some(Instant::now() + quiet_period);
                    }
                    Some(SchedulerCommand::Cancel) => {
                        if deadline.take().is_some() {
                            tracing::debug!("Pending debounced flush cancelled");
                        }
                    }
                    None => break,
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    let adapter = Arc::clone(&adapter);
                    let registry = registry.clone();
                    let stats = Arc::clone(&stats);
                    in_flight.spawn(async move {
                        Self::flush(&adapter, &registry, &stats).await;
                    });
                }
            }
        }
    }

    async fn flush(
        adapter: &Arc<dyn PersistenceAdapter>,
        registry: &StateRegistry,
        stats: &SchedulerStats,
    ) {
        stats.pending.store(false, Ordering::SeqCst);
        stats.flushes.fetch_add(1, Ordering::SeqCst);

        let report = write_all(adapter.as_ref(), registry).await;
        if report.is_success() {
            tracing::debug!(
                "Debounced flush wrote {} collections at revision {}",
                report.written.len(),
                report.revision
            );
        } else {
            stats
                .failed_writes
                .fetch_add(report.failed.len() as u64, Ordering::SeqCst);
            for (key, err) in &report.failed {
                tracing::warn!("Background write of {} failed: {}", key, err);
            }
        }
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
