//! Full-state captures ("vault items") and the automatic snapshot window
//!
//! A snapshot is prepended to the `vault_items` collection in the registry.
//! It becomes durable on the next flush, like any other mutation.

use crate::error::SyncResult;
use crate::memory::PersistenceAdapter;
use crate::state::collections::{LAST_AUTO_SNAPSHOT_KEY, META_COLLECTION};
use crate::state::{CollectionKey, StateRegistry, SEAL_IMAGE_ASSET};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Rolling window between automatic snapshots
pub const DEFAULT_AUTO_SNAPSHOT_INTERVAL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultItem {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub is_automatic: bool,
    pub label: String,
    /// Registry revision the payload was captured from
    pub revision: u64,
    /// `{ "collections": {...}, "assets": {...} }`
    pub payload: Value,
}

impl VaultItem {
    /// Captured value of one collection, if it is part of the payload
    pub fn collection(&self, key: CollectionKey) -> Option<&Value> {
        self.payload.get("collections")?.get(key.as_str())
    }
}

pub struct SnapshotService {
    registry: StateRegistry,
    adapter: Arc<dyn PersistenceAdapter>,
    auto_interval: Duration,
}

impl SnapshotService {
    pub fn new(
        registry: StateRegistry,
        adapter: Arc<dyn PersistenceAdapter>,
        auto_interval: Duration,
    ) -> Self {
        Self {
            registry,
            adapter,
            auto_interval,
        }
    }

    pub fn auto_interval(&self) -> Duration {
        self.auto_interval
    }

    /// Capture the registry as it is now and prepend the item to `vault_items`
    pub async fn create_snapshot(&self, automatic: bool) -> VaultItem {
        self.create_snapshot_at(automatic, Utc::now()).await
    }

    pub async fn create_snapshot_at(&self, automatic: bool, now: DateTime<Utc>) -> VaultItem {
        // Read before the first await so the capture matches the call instant
        let snapshot = self.registry.read();

        let mut collections = Map::new();
        for (key, value) in &snapshot.collections {
            if !key.is_snapshot_excluded() {
                collections.insert(key.as_str().to_string(), value.clone());
            }
        }

        let mut assets = Map::new();
        match self.adapter.get_asset(SEAL_IMAGE_ASSET).await {
            Ok(Some(blob)) => {
                assets.insert(
                    SEAL_IMAGE_ASSET.to_string(),
                    Value::String(BASE64.encode(&blob)),
                );
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Snapshot taken without seal image: {}", e),
        }

        let mut payload = Map::new();
        payload.insert("collections".to_string(), Value::Object(collections));
        payload.insert("assets".to_string(), Value::Object(assets));

        let item = VaultItem {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            is_automatic: automatic,
            label: if automatic {
                format!("Automatic snapshot {}", now.format("%Y-%m-%d %H:%M"))
            } else {
                format!("Manual seal {}", now.format("%Y-%m-%d %H:%M"))
            },
            revision: snapshot.revision,
            payload: Value::Object(payload),
        };

        match serde_json::to_value(&item) {
            Ok(entry) => {
                self.registry.mutate(CollectionKey::VaultItems, move |items| {
                    if !items.is_array() {
                        *items = Value::Array(Vec::new());
                    }
                    if let Some(list) = items.as_array_mut() {
                        list.insert(0, entry);
                    }
                });
            }
            Err(e) => tracing::error!("Failed to encode vault item {}: {}", item.id, e),
        }

        tracing::info!(
            "Created {} snapshot {} at revision {}",
            if automatic { "automatic" } else { "manual" },
            item.id,
            item.revision
        );
        item
    }

    /// Startup check using the wall clock
    pub async fn run_startup_check(&self) -> SyncResult<Option<VaultItem>> {
        self.run_startup_check_at(Utc::now()).await
    }

    /// Create an automatic snapshot if none was taken within the window.
    ///
    /// The persisted timestamp is the only dedup mechanism, so it is written
    /// straight to the adapter instead of waiting for the next flush.
    pub async fn run_startup_check_at(&self, now: DateTime<Utc>) -> SyncResult<Option<VaultItem>> {
        let last = self.last_automatic_snapshot().await?;
        let due = match last {
            // Clock moved backwards since the last run; the stored time is unusable
            Some(last) if last > now => {
                tracing::warn!(
                    "Last automatic snapshot {} is in the future, taking a new one",
                    last
                );
                true
            }
            Some(last) => now.signed_duration_since(last) > self.auto_interval,
            None => true,
        };
        if !due {
            tracing::debug!("Automatic snapshot not due (last at {:?})", last);
            return Ok(None);
        }

        let item = self.create_snapshot_at(true, now).await;
        if let Err(e) = self
            .adapter
            .set(
                META_COLLECTION,
                Value::String(now.to_rfc3339()),
                Some(LAST_AUTO_SNAPSHOT_KEY),
            )
            .await
        {
            tracing::warn!("Failed to persist automatic snapshot timestamp: {}", e);
        }
        Ok(Some(item))
    }

    /// Persisted time of the last automatic snapshot. Unparsable values read as absent.
    pub async fn last_automatic_snapshot(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let stored = self
            .adapter
            .get(META_COLLECTION, Some(LAST_AUTO_SNAPSHOT_KEY))
            .await?;
        Ok(stored
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Vault items currently in the registry, newest first
    pub fn vault_items(&self) -> Vec<VaultItem> {
        vault_items_from(&self.registry.get(CollectionKey::VaultItems))
    }
}

/// Decode a `vault_items` collection value, skipping malformed entries
pub fn vault_items_from(value: &Value) -> Vec<VaultItem> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
