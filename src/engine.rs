//! Top-level controller
//!
//! Owns the registry and wires the persistence adapter, debounce scheduler,
//! snapshot service, hard-save protocol and access gate together. The view
//! layer talks only to `SyncEngine`.

use crate::config::EngineConfig;
use crate::gate::{
    AccessGate, GateState, HoldRitual, NavigationDecision, UnlockTick, ViewId,
};
use crate::memory::{InMemoryAdapter, MemoryStore, PersistenceAdapter};
use crate::notifications::ToastQueue;
use crate::state::{
    hydrate, CollectionKey, HydrationReport, RegistrySnapshot, StateRegistry, SubscriptionId,
    SEAL_IMAGE_ASSET,
};
use crate::sync::DebounceScheduler;
use crate::vault::{
    BuildMetric, BuildMetricLog, HardSaveOutcome, HardSaveProtocol, SnapshotService, VaultItem,
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// What `start()` did
#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    pub backend: &'static str,
    pub hydration: HydrationReport,
    /// Id of the automatic snapshot taken at startup, if one was due
    pub auto_snapshot: Option<String>,
}

/// Point-in-time summary for status displays
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub backend: &'static str,
    pub degraded: bool,
    pub revision: u64,
    pub gate: GateState,
    pub guest_mode: bool,
    pub pending_destination: Option<ViewId>,
    pub flush_pending: bool,
    pub flushes: u64,
    pub failed_background_writes: u64,
    pub vault_items: usize,
    pub last_hard_save: Option<BuildMetric>,
}

struct Attached {
    scheduler: DebounceScheduler,
    subscription: SubscriptionId,
}

pub struct SyncEngine {
    config: EngineConfig,
    adapter: Arc<dyn PersistenceAdapter>,
    degraded: bool,
    registry: StateRegistry,
    snapshots: Arc<SnapshotService>,
    metrics: BuildMetricLog,
    toasts: ToastQueue,
    gate: Mutex<AccessGate>,
    attached: Mutex<Option<Arc<Attached>>>,
}

impl SyncEngine {
    /// Open the on-device store. If it cannot be opened the engine keeps
    /// working in memory only.
    pub fn open(config: EngineConfig) -> Self {
        let opened = config
            .resolved_data_dir()
            .and_then(|dir| MemoryStore::open_in(&dir).map_err(anyhow::Error::from));

        match opened {
            Ok(store) => Self::build(config, Arc::new(store), false),
            Err(e) => {
                tracing::error!(
                    "Persistent store unavailable, running in memory only: {:#}",
                    e
                );
                Self::build(config, Arc::new(InMemoryAdapter::new()), true)
            }
        }
    }

    /// Use a caller-supplied adapter
    pub fn with_adapter(config: EngineConfig, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        Self::build(config, adapter, false)
    }

    fn build(config: EngineConfig, adapter: Arc<dyn PersistenceAdapter>, degraded: bool) -> Self {
        let registry = StateRegistry::new();
        let snapshots = Arc::new(SnapshotService::new(
            registry.clone(),
            Arc::clone(&adapter),
            config.auto_snapshot_interval(),
        ));
        let metrics = BuildMetricLog::new(registry.clone(), config.build_metric_cap);
        let gate = AccessGate::new(
            config.sensitive_destinations.iter().map(String::as_str),
            HoldRitual::new(config.unlock_hold()),
            config.guest_mode,
        );

        Self {
            config,
            adapter,
            degraded,
            registry,
            snapshots,
            metrics,
            toasts: ToastQueue::new(),
            gate: Mutex::new(gate),
            attached: Mutex::new(None),
        }
    }

    /// Initialize storage, hydrate, run the automatic snapshot check and
    /// start background persistence. Must be called inside a tokio runtime.
    ///
    /// Later calls do nothing: hydrating again would replace unflushed values.
    pub async fn start(&self) -> StartupReport {
        if self.attached().is_some() {
            tracing::warn!("Engine already started; start() ignored");
            return StartupReport {
                backend: self.adapter.backend_name(),
                hydration: HydrationReport::default(),
                auto_snapshot: None,
            };
        }

        if let Err(e) = self.adapter.init().await {
            tracing::error!("Persistence init failed: {}", e);
        }

        let hydration = hydrate(self.adapter.as_ref(), &self.registry).await;
        self.sync_guest_mode();

        // Attach first so the startup snapshot flows through the normal flush path
        self.attach_scheduler();

        let auto_snapshot = match self.snapshots.run_startup_check().await {
            Ok(item) => item.map(|item| item.id),
            Err(e) => {
                tracing::error!("Automatic snapshot check failed: {}", e);
                None
            }
        };

        tracing::info!(
            "Engine started on {} backend (revision {})",
            self.adapter.backend_name(),
            self.registry.revision()
        );

        StartupReport {
            backend: self.adapter.backend_name(),
            hydration,
            auto_snapshot,
        }
    }

    fn attach_scheduler(&self) {
        let mut attached = self.attached_guard();
        if attached.is_some() {
            tracing::warn!("Engine already started; scheduler left as is");
            return;
        }
        let scheduler = DebounceScheduler::start(
            Arc::clone(&self.adapter),
            self.registry.clone(),
            self.config.quiet_period(),
        );
        let subscription = scheduler.attach(&self.registry);
        *attached = Some(Arc::new(Attached {
            scheduler,
            subscription,
        }));
    }

    /// Apply an update to one collection. Returns the new registry revision.
    pub fn on_mutate<F>(&self, key: CollectionKey, updater: F) -> u64
    where
        F: FnOnce(&mut Value),
    {
        let revision = self.registry.mutate(key, updater);
        if key == CollectionKey::Settings {
            self.sync_guest_mode();
        }
        revision
    }

    /// Every collection as of the latest mutation
    pub fn read(&self) -> RegistrySnapshot {
        self.registry.read()
    }

    /// Read-only copy of one collection
    pub fn collection(&self, key: CollectionKey) -> Value {
        self.registry.get(key)
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn backend_name(&self) -> &'static str {
        self.adapter.backend_name()
    }

    pub async fn hard_save(&self) -> HardSaveOutcome {
        let mut protocol = HardSaveProtocol::new(
            Arc::clone(&self.adapter),
            self.registry.clone(),
            Arc::clone(&self.snapshots),
            self.metrics.clone(),
            self.toasts.clone(),
        );
        if let Some(attached) = self.attached() {
            protocol = protocol.with_debounce(attached.scheduler.handle());
        }
        protocol.execute().await
    }

    /// Manual snapshot without a flush
    pub async fn seal(&self) -> VaultItem {
        self.snapshots.create_snapshot(false).await
    }

    pub fn vault_items(&self) -> Vec<VaultItem> {
        self.snapshots.vault_items()
    }

    pub fn build_metrics(&self) -> Vec<BuildMetric> {
        self.metrics.entries()
    }

    // Gate

    pub fn is_sensitive(&self, destination: &str) -> bool {
        self.gate_guard().is_sensitive(&ViewId::from(destination))
    }

    pub fn request_navigate(&self, destination: impl Into<ViewId>) -> NavigationDecision {
        self.gate_guard().request_navigate(destination.into())
    }

    pub fn unlock_begin(&self) -> UnlockTick {
        self.gate_guard().unlock_begin(Instant::now())
    }

    pub fn unlock_tick(&self) -> UnlockTick {
        self.gate_guard().tick(Instant::now())
    }

    pub fn unlock_end(&self) -> UnlockTick {
        self.gate_guard().unlock_end(Instant::now())
    }

    pub fn cancel_unlock(&self) {
        self.gate_guard().cancel();
    }

    pub fn gate_state(&self) -> GateState {
        self.gate_guard().state()
    }

    pub fn pending_destination(&self) -> Option<ViewId> {
        self.gate_guard().pending_destination().cloned()
    }

    /// Persist the guest-mode flag in settings
    pub fn set_guest_mode(&self, enabled: bool) {
        self.on_mutate(CollectionKey::Settings, |settings| {
            if !settings.is_object() {
                *settings = Value::Object(Default::default());
            }
            if let Some(map) = settings.as_object_mut() {
                map.insert("guest_mode".to_string(), Value::Bool(enabled));
            }
        });
    }

    pub fn guest_mode(&self) -> bool {
        self.gate_guard().guest_mode()
    }

    // Assets

    /// Store the seal image. Failure is reported as an error toast.
    pub async fn set_seal_image(&self, image: Bytes) -> bool {
        let size = image.len();
        match self.adapter.set_asset(SEAL_IMAGE_ASSET, image).await {
            Ok(()) => {
                self.on_mutate(CollectionKey::Settings, |settings| {
                    if let Some(map) = settings.as_object_mut() {
                        map.insert("has_seal_image".to_string(), Value::Bool(true));
                    }
                });
                tracing::info!("Stored seal image ({} bytes)", size);
                self.toasts.success("Seal image", "Seal image updated");
                true
            }
            Err(e) => {
                self.toasts
                    .error("Seal image", format!("Could not save the seal image: {}", e));
                false
            }
        }
    }

    pub async fn seal_image(&self) -> Option<Bytes> {
        match self.adapter.get_asset(SEAL_IMAGE_ASSET).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Failed to read seal image: {}", e);
                None
            }
        }
    }

    pub fn toasts(&self) -> &ToastQueue {
        &self.toasts
    }

    pub fn status(&self) -> EngineStatus {
        let (gate, guest_mode, pending_destination) = {
            let gate = self.gate_guard();
            (
                gate.state(),
                gate.guest_mode(),
                gate.pending_destination().cloned(),
            )
        };
        let attached = self.attached();

        EngineStatus {
            backend: self.adapter.backend_name(),
            degraded: self.degraded,
            revision: self.registry.revision(),
            gate,
            guest_mode,
            pending_destination,
            flush_pending: attached.as_ref().map_or(false, |a| a.scheduler.is_pending()),
            flushes: attached.as_ref().map_or(0, |a| a.scheduler.flush_count()),
            failed_background_writes: attached
                .as_ref()
                .map_or(0, |a| a.scheduler.failed_write_count()),
            vault_items: self.vault_items().len(),
            last_hard_save: self.metrics.latest(),
        }
    }

    /// Stop background persistence, flushing any pending change first
    pub async fn shutdown(&self) {
        let attached = self.attached_guard().take();
        if let Some(attached) = attached {
            self.registry.unsubscribe(attached.subscription);
            attached.scheduler.shutdown().await;
            tracing::info!(
                "Engine stopped after {} background flushes",
                attached.scheduler.flush_count()
            );
        }
    }

    /// Guest mode is on if either the config or the settings collection says so
    fn sync_guest_mode(&self) {
        let from_settings = self
            .registry
            .get(CollectionKey::Settings)
            .get("guest_mode")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.gate_guard()
            .set_guest_mode(self.config.guest_mode || from_settings);
    }

    fn gate_guard(&self) -> MutexGuard<'_, AccessGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attached_guard(&self) -> MutexGuard<'_, Option<Arc<Attached>>> {
        self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attached(&self) -> Option<Arc<Attached>> {
        self.attached_guard().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::ToastLevel;
    use crate::state::collections::{LAST_AUTO_SNAPSHOT_KEY, META_COLLECTION};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use std::time::Duration;

    fn engine_on(adapter: &Arc<InMemoryAdapter>) -> SyncEngine {
        SyncEngine::with_adapter(
            EngineConfig::default(),
            Arc::clone(adapter) as Arc<dyn PersistenceAdapter>,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_start_seeds_and_takes_automatic_snapshot() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let engine = engine_on(&adapter);

        let report = engine.start().await;
        assert!(report.hydration.first_run);
        assert!(report.hydration.seeded.contains(&CollectionKey::CouncilMembers));
        assert!(report.auto_snapshot.is_some());

        let items = engine.vault_items();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_automatic);
        assert!(adapter
            .writes_for(META_COLLECTION)
            .iter()
            .any(|v| v.is_string()));

        engine.shutdown().await;
        assert_eq!(adapter.writes_for("vault_items").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_within_window_takes_no_new_snapshot() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let first = engine_on(&adapter);
        first.start().await;
        first.shutdown().await;

        let second = engine_on(&adapter);
        let report = second.start().await;
        assert!(!report.hydration.first_run);
        assert!(report.auto_snapshot.is_none());
        assert_eq!(second.vault_items().len(), 1);
        second.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timestamp_takes_exactly_one_snapshot() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let stale = (Utc::now() - ChronoDuration::hours(25)).to_rfc3339();
        adapter.preload(META_COLLECTION, Some(LAST_AUTO_SNAPSHOT_KEY), json!(stale));

        let engine = engine_on(&adapter);
        assert!(engine.start().await.auto_snapshot.is_some());
        assert_eq!(engine.vault_items().len(), 1);
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_are_debounced_into_one_write() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let engine = engine_on(&adapter);
        engine.start().await;
        tokio::time::sleep(Duration::from_millis(2100)).await;
        let before = adapter.writes_for("memories").len();

        for value in ["A", "B", "C"] {
            engine.on_mutate(CollectionKey::Memories, |m| *m = json!([value]));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let writes = adapter.writes_for("memories");
        assert_eq!(writes.len(), before + 1);
        assert_eq!(writes.last(), Some(&json!(["C"])));
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_keeps_unflushed_values() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let engine = engine_on(&adapter);
        engine.start().await;

        engine.on_mutate(CollectionKey::Memories, |m| *m = json!(["unsaved"]));
        let report = engine.start().await;

        assert!(report.auto_snapshot.is_none());
        assert!(report.hydration.loaded.is_empty());
        assert_eq!(engine.collection(CollectionKey::Memories), json!(["unsaved"]));
        assert_eq!(engine.vault_items().len(), 1);
        engine.shutdown().await;
        assert_eq!(adapter.writes_for("memories").last(), Some(&json!(["unsaved"])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_save_records_metric_and_snapshot() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let engine = engine_on(&adapter);
        engine.start().await;

        let outcome = engine.hard_save().await;
        assert!(outcome.success);
        assert_eq!(engine.vault_items().len(), 2);
        assert_eq!(engine.build_metrics().len(), 1);
        assert!(engine.status().last_hard_save.unwrap().success);
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_flow_through_engine() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let config = EngineConfig {
            unlock_hold_ms: 0,
            ..EngineConfig::default()
        };
        let engine =
            SyncEngine::with_adapter(config, Arc::clone(&adapter) as Arc<dyn PersistenceAdapter>);
        engine.start().await;

        assert!(engine.is_sensitive("vault"));
        assert_eq!(
            engine.request_navigate("vault"),
            NavigationDecision::Deferred("vault".into())
        );
        assert_eq!(engine.pending_destination(), Some(ViewId::from("vault")));
        assert_eq!(
            engine.unlock_begin(),
            UnlockTick::Unlocked(Some("vault".into()))
        );
        assert_eq!(engine.gate_state(), GateState::Locked);
        assert!(engine.pending_destination().is_none());
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_mode_from_settings_bypasses_gate() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let engine = engine_on(&adapter);
        engine.start().await;

        engine.set_guest_mode(true);
        assert!(engine.guest_mode());
        assert_eq!(
            engine.request_navigate("vault"),
            NavigationDecision::Proceed("vault".into())
        );
        assert_eq!(engine.gate_state(), GateState::Open);

        engine.set_guest_mode(false);
        assert_eq!(
            engine.request_navigate("vault"),
            NavigationDecision::Deferred("vault".into())
        );
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_seal_image_round_trip() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let engine = engine_on(&adapter);
        engine.start().await;

        assert!(engine.set_seal_image(Bytes::from_static(b"png")).await);
        assert_eq!(engine.seal_image().await, Some(Bytes::from_static(b"png")));
        assert_eq!(
            engine.collection(CollectionKey::Settings)["has_seal_image"],
            json!(true)
        );
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_seal_image_failure_surfaces_toast() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let engine = engine_on(&adapter);
        engine.start().await;
        engine.toasts().drain();
        adapter.fail_assets(true);

        assert!(!engine.set_seal_image(Bytes::from_static(b"png")).await);
        let toasts = engine.toasts().drain();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].level, ToastLevel::Error);
        assert_eq!(
            engine.collection(CollectionKey::Settings)["has_seal_image"],
            json!(false)
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_falls_back_to_memory_when_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let engine = SyncEngine::open(EngineConfig {
            data_dir: Some(blocker),
            ..EngineConfig::default()
        });
        assert!(engine.is_degraded());
        assert_eq!(engine.backend_name(), "in-memory");
    }

    #[tokio::test]
    async fn test_open_uses_sled_store() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SyncEngine::open(EngineConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        });
        assert!(!engine.is_degraded());
        assert_eq!(engine.backend_name(), "sled");
    }
}
