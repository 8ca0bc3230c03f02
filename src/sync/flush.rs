//! Parallel write of every collection
//!
//! Values are read from the registry when the flush runs, never earlier.

use crate::memory::PersistenceAdapter;
use crate::state::{CollectionKey, StateRegistry};
use futures::future::join_all;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlushReport {
    /// Registry revision the written values came from
    pub revision: u64,
    pub written: Vec<CollectionKey>,
    pub failed: Vec<(CollectionKey, String)>,
}

impl FlushReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Combined error text for failed collections
    pub fn error_message(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .failed
            .iter()
            .map(|(key, err)| format!("{}: {}", key, err))
            .collect();
        Some(parts.join("; "))
    }
}

/// Dispatch one write per collection concurrently and wait for all of them
/// to settle. A failing write never cancels its siblings.
pub async fn write_all(adapter: &dyn PersistenceAdapter, registry: &StateRegistry) -> FlushReport {
    let snapshot = registry.read();
    let revision = snapshot.revision;

    let writes = snapshot.collections.into_iter().map(|(key, value)| async move {
        let result = adapter.set(key.as_str(), value, None).await;
        (key, result)
    });

    let mut report = FlushReport {
        revision,
        ..Default::default()
    };
    for (key, result) in join_all(writes).await {
        match result {
            Ok(()) => report.written.push(key),
            Err(e) => report.failed.push((key, e.to_string())),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryAdapter;
    use serde_json::json;

    #[tokio::test]
    async fn test_writes_every_collection() {
        let adapter = InMemoryAdapter::new();
        let registry = StateRegistry::new();
        registry.replace(CollectionKey::DreamLog, json!(["flying"]));

        let report = write_all(&adapter, &registry).await;

        assert!(report.is_success());
        assert_eq!(report.revision, 1);
        assert_eq!(report.written.len(), CollectionKey::ALL.len());
        assert_eq!(adapter.writes_for("dream_log"), vec![json!(["flying"])]);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let adapter = InMemoryAdapter::new();
        adapter.fail_collection("ledger");
        let registry = StateRegistry::new();
        registry.replace(CollectionKey::Memories, json!(["M"]));

        let report = write_all(&adapter, &registry).await;

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, CollectionKey::Ledger);
        assert_eq!(report.written.len(), CollectionKey::ALL.len() - 1);
        assert_eq!(adapter.writes_for("memories"), vec![json!(["M"])]);
        assert!(report.error_message().unwrap().starts_with("ledger:"));
    }
}
