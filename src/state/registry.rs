//! Authoritative in-memory store of every collection
//!
//! Deferred work (debounced flushes, hard saves, snapshots) must resolve values
//! through [`StateRegistry::read`] when it executes. Nothing in the crate hands a
//! captured value to a deferred task.

use super::collections::CollectionKey;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Emitted to observers after every mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationEvent {
    pub key: CollectionKey,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Type alias for mutation observer callbacks
type Observer = Arc<dyn Fn(&MutationEvent) + Send + Sync>;

/// Point-in-time copy of all collections
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub revision: u64,
    pub collections: BTreeMap<CollectionKey, Value>,
}

impl RegistrySnapshot {
    pub fn get(&self, key: CollectionKey) -> Option<&Value> {
        self.collections.get(&key)
    }
}

struct RegistryInner {
    collections: BTreeMap<CollectionKey, Value>,
    revision: u64,
}

#[derive(Clone)]
pub struct StateRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    observers: Arc<RwLock<Vec<(SubscriptionId, Observer)>>>,
    next_subscription: Arc<AtomicU64>,
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StateRegistry {
    /// Create a registry with every collection at its empty default
    pub fn new() -> Self {
        let collections = CollectionKey::ALL
            .iter()
            .map(|key| (*key, key.default_value()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                collections,
                revision: 0,
            })),
            observers: Arc::new(RwLock::new(Vec::new())),
            next_subscription: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Snapshot of all collections reflecting every mutation applied before the call
    pub fn read(&self) -> RegistrySnapshot {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        RegistrySnapshot {
            revision: guard.revision,
            collections: guard.collections.clone(),
        }
    }

    /// Current value of a single collection
    pub fn get(&self, key: CollectionKey) -> Value {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .collections
            .get(&key)
            .cloned()
            .unwrap_or_else(|| key.default_value())
    }

    pub fn revision(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }

    /// Apply an updater to a collection and notify observers. Returns the new revision.
    pub fn mutate<F>(&self, key: CollectionKey, updater: F) -> u64
    where
        F: FnOnce(&mut Value),
    {
        let revision = {
            let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let value = guard
                .collections
                .entry(key)
                .or_insert_with(|| key.default_value());
            updater(value);
            guard.revision += 1;
            guard.revision
        };

        // Lock released before observers run so they can read the registry
        self.notify(MutationEvent { key, revision });
        revision
    }

    /// Overwrite a collection and notify observers
    pub fn replace(&self, key: CollectionKey, value: Value) -> u64 {
        self.mutate(key, move |slot| *slot = value)
    }

    /// Install a value without notifying observers (hydration from storage)
    pub(crate) fn load(&self, key: CollectionKey, value: Value) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.collections.insert(key, value);
    }

    /// Register a mutation observer
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&MutationEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn notify(&self, event: MutationEvent) {
        let observers: Vec<Observer> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(&event);
        }
    }
}
