//! Map-backed adapter
//!
//! Used when the on-device store cannot be opened (the engine keeps running
//! in-memory only) and by tests, which can inject failures and hangs.

use super::adapter::{PersistenceAdapter, DEFAULT_KEY};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct Inner {
    values: HashMap<(String, String), Value>,
    assets: HashMap<String, Bytes>,
    /// Every successful `set`, in call order
    write_log: Vec<(String, Value)>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    fail_assets: bool,
    write_delay: Option<Duration>,
}

#[derive(Default)]
pub struct InMemoryAdapter {
    inner: Mutex<Inner>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `set` against `collection` fail until cleared
    pub fn fail_collection(&self, collection: &str) {
        self.with_inner(|inner| {
            inner.failing.insert(collection.to_string());
        });
    }

    /// Make every `set` against `collection` never resolve
    pub fn hang_collection(&self, collection: &str) {
        self.with_inner(|inner| {
            inner.hanging.insert(collection.to_string());
        });
    }

    /// Make asset writes fail
    pub fn fail_assets(&self, fail: bool) {
        self.with_inner(|inner| inner.fail_assets = fail);
    }

    /// Delay every `set` by `delay` before it lands
    pub fn set_write_delay(&self, delay: Duration) {
        self.with_inner(|inner| inner.write_delay = Some(delay));
    }

    /// Remove all injected failures and hangs
    pub fn clear_faults(&self) {
        self.with_inner(|inner| {
            inner.failing.clear();
            inner.hanging.clear();
            inner.fail_assets = false;
            inner.write_delay = None;
        });
    }

    /// Values written to `collection`, oldest first
    pub fn writes_for(&self, collection: &str) -> Vec<Value> {
        self.with_inner(|inner| {
            inner
                .write_log
                .iter()
                .filter(|(c, _)| c == collection)
                .map(|(_, v)| v.clone())
                .collect()
        })
    }

    /// Total number of successful `set` calls
    pub fn write_count(&self) -> usize {
        self.with_inner(|inner| inner.write_log.len())
    }

    /// Seed a value without recording it as a write
    pub fn preload(&self, collection: &str, key: Option<&str>, value: Value) {
        self.with_inner(|inner| {
            inner.values.insert(
                (collection.to_string(), key.unwrap_or(DEFAULT_KEY).to_string()),
                value,
            );
        });
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryAdapter {
    async fn init(&self) -> SyncResult<()> {
        Ok(())
    }

    async fn get(&self, collection: &str, key: Option<&str>) -> SyncResult<Option<Value>> {
        let key = (collection.to_string(), key.unwrap_or(DEFAULT_KEY).to_string());
        Ok(self.with_inner(|inner| inner.values.get(&key).cloned()))
    }

    async fn set(&self, collection: &str, value: Value, key: Option<&str>) -> SyncResult<()> {
        let (fail, hang, delay) = self.with_inner(|inner| {
            (
                inner.failing.contains(collection),
                inner.hanging.contains(collection),
                inner.write_delay,
            )
        });
        if hang {
            futures::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(SyncError::Storage(format!(
                "injected write failure for {}",
                collection
            )));
        }

        self.with_inner(|inner| {
            inner.values.insert(
                (collection.to_string(), key.unwrap_or(DEFAULT_KEY).to_string()),
                value.clone(),
            );
            inner.write_log.push((collection.to_string(), value));
        });
        Ok(())
    }

    async fn get_asset(&self, name: &str) -> SyncResult<Option<Bytes>> {
        Ok(self.with_inner(|inner| inner.assets.get(name).cloned()))
    }

    async fn set_asset(&self, name: &str, blob: Bytes) -> SyncResult<()> {
        self.with_inner(|inner| {
            if inner.fail_assets {
                return Err(SyncError::Storage(format!(
                    "injected asset failure for {}",
                    name
                )));
            }
            inner.assets.insert(name.to_string(), blob);
            Ok(())
        })
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}
