//! User-invoked, non-debounced flush of every collection
//!
//! 1. record start time
//! 2. write every collection in parallel and wait for all writes to settle
//! 3. on full success, take a manual snapshot (visible in `vault_items` now,
//!    durable after the next flush)
//! 4. measure duration
//! 5. append exactly one build metric, whatever the outcome
//!
//! Collections that did write are not rolled back when a sibling fails.

use super::build_metrics::{BuildMetric, BuildMetricLog};
use super::snapshot::SnapshotService;
use crate::memory::PersistenceAdapter;
use crate::notifications::ToastQueue;
use crate::state::{CollectionKey, StateRegistry};
use crate::sync::{write_all, DebounceHandle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct HardSaveOutcome {
    pub success: bool,
    pub duration_ms: u64,
    pub snapshot_id: Option<String>,
    pub failed_collections: Vec<CollectionKey>,
    pub error_message: Option<String>,
}

pub struct HardSaveProtocol {
    adapter: Arc<dyn PersistenceAdapter>,
    registry: StateRegistry,
    snapshots: Arc<SnapshotService>,
    metrics: BuildMetricLog,
    toasts: ToastQueue,
    debounce: Option<DebounceHandle>,
}

impl HardSaveProtocol {
    pub fn new(
        adapter: Arc<dyn PersistenceAdapter>,
        registry: StateRegistry,
        snapshots: Arc<SnapshotService>,
        metrics: BuildMetricLog,
        toasts: ToastQueue,
    ) -> Self {
        Self {
            adapter,
            registry,
            snapshots,
            metrics,
            toasts,
            debounce: None,
        }
    }

    /// Cancel this scheduler's pending timer whenever a hard save runs
    pub fn with_debounce(mut self, debounce: DebounceHandle) -> Self {
        self.debounce = Some(debounce);
        self
    }

    pub async fn execute(&self) -> HardSaveOutcome {
        let started = Instant::now();
        self.toasts.info("Hard save", "Sealing every collection...");

        // The writes below already carry the latest values; a pending
        // debounced flush would only repeat them.
        if let Some(debounce) = &self.debounce {
            debounce.cancel_pending();
        }

        let report = write_all(self.adapter.as_ref(), &self.registry).await;
        let success = report.is_success();

        let snapshot_id = if success {
            Some(self.snapshots.create_snapshot(false).await.id)
        } else {
            None
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let error_message = report.error_message();
        self.metrics.record(BuildMetric::new(
            success,
            duration_ms,
            error_message.clone(),
        ));

        if success {
            tracing::info!(
                "Hard save wrote {} collections in {}ms",
                report.written.len(),
                duration_ms
            );
            self.toasts.success(
                "Hard save",
                format!("All collections sealed in {}ms", duration_ms),
            );
        } else {
            tracing::warn!(
                "Hard save failed after {}ms: {}",
                duration_ms,
                error_message.as_deref().unwrap_or("unknown error")
            );
            self.toasts.error(
                "Hard save failed",
                error_message.clone().unwrap_or_default(),
            );
        }

        HardSaveOutcome {
            success,
            duration_ms,
            snapshot_id,
            failed_collections: report.failed.iter().map(|(key, _)| *key).collect(),
            error_message,
        }
    }
}
