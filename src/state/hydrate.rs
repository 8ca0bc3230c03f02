//! Initial load of every collection from the persistence adapter

use super::collections::{CollectionKey, FIRST_RUN_COMPLETED_KEY, META_COLLECTION};
use super::registry::StateRegistry;
use super::seed::seed_value;
use crate::memory::PersistenceAdapter;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize)]
pub struct HydrationReport {
    pub first_run: bool,
    pub loaded: Vec<CollectionKey>,
    pub seeded: Vec<CollectionKey>,
    pub defaulted: Vec<CollectionKey>,
    pub failed: Vec<(CollectionKey, String)>,
}

/// Populate the registry from storage.
///
/// A missing value is never an error: allow-listed collections receive seed
/// data on the very first run, everything else starts empty. Read failures
/// degrade that collection to its default and leave the rest untouched.
pub async fn hydrate(adapter: &dyn PersistenceAdapter, registry: &StateRegistry) -> HydrationReport {
    let mut report = HydrationReport {
        first_run: is_first_run(adapter).await,
        ..Default::default()
    };

    for key in CollectionKey::ALL {
        match adapter.get(key.as_str(), None).await {
            Ok(Some(value)) => {
                registry.load(key, value);
                report.loaded.push(key);
            }
            Ok(None) => match seed_value(key).filter(|_| report.first_run) {
                Some(seed) => {
                    registry.load(key, seed);
                    report.seeded.push(key);
                }
                None => {
                    registry.load(key, key.default_value());
                    report.defaulted.push(key);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to load collection {}: {}", key, e);
                registry.load(key, key.default_value());
                report.failed.push((key, e.to_string()));
            }
        }
    }

    if report.first_run {
        record_first_run(adapter, registry, &report.seeded).await;
    }

    tracing::info!(
        "Hydrated registry: {} loaded, {} seeded, {} empty, {} failed (first run: {})",
        report.loaded.len(),
        report.seeded.len(),
        report.defaulted.len(),
        report.failed.len(),
        report.first_run
    );
    report
}

/// Persist the seeds, then the completion marker. The marker is only written
/// once every seed is durable, so an interrupted first run seeds again.
async fn record_first_run(
    adapter: &dyn PersistenceAdapter,
    registry: &StateRegistry,
    seeded: &[CollectionKey],
) {
    let writes = seeded.iter().map(|key| async move {
        let result = adapter.set(key.as_str(), registry.get(*key), None).await;
        (*key, result)
    });

    let mut complete = true;
    for (key, result) in join_all(writes).await {
        if let Err(e) = result {
            tracing::warn!("Failed to persist seed data for {}: {}", key, e);
            complete = false;
        }
    }
    if !complete {
        return;
    }

    if let Err(e) = adapter
        .set(META_COLLECTION, Value::Bool(true), Some(FIRST_RUN_COMPLETED_KEY))
        .await
    {
        tracing::warn!("Failed to record first-run completion: {}", e);
    }
}

/// First run lasts until the completion marker is stored. Seeds only fill
/// collections with nothing persisted, so an interrupted first run can be
/// repeated safely. An unreadable marker counts as not-first-run.
async fn is_first_run(adapter: &dyn PersistenceAdapter) -> bool {
    let marker = adapter
        .get(META_COLLECTION, Some(FIRST_RUN_COMPLETED_KEY))
        .await;
    matches!(marker, Ok(None))
}
