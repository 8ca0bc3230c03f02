//! Sled-based collection store
//! Persistent key-value storage with crash safety

use super::adapter::{PersistenceAdapter, ASSET_TREE, DEFAULT_KEY};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use sled::Db;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const STORE_FILE: &str = "store.db";

/// Collection store backed by sled. One tree per collection.
pub struct MemoryStore {
    db: Arc<Db>,
}

impl MemoryStore {
    /// Open a store inside the given data directory
    pub fn open_in(data_dir: &Path) -> SyncResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        Self::open(data_dir.join(STORE_FILE))
    }

    /// Open a store at a specific path
    pub fn open(path: PathBuf) -> SyncResult<Self> {
        let db = sled::open(&path)?;
        tracing::debug!("Opened sled store at {:?}", path);
        Ok(Self { db: Arc::new(db) })
    }

    /// Get the default data directory
    pub fn default_data_dir() -> SyncResult<PathBuf> {
        let mut path = dirs::data_dir()
            .ok_or_else(|| SyncError::Storage("No data directory found".to_string()))?;
        path.push("vaultkeep");
        Ok(path)
    }

    fn get_blocking(&self, tree: &str, key: &str) -> SyncResult<Option<Value>> {
        let tree = self.db.open_tree(tree)?;
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_blocking(&self, tree: &str, key: &str, value: &Value) -> SyncResult<()> {
        let tree = self.db.open_tree(tree)?;
        let bytes = serde_json::to_vec(value)?;
        tree.insert(key.as_bytes(), bytes)?;
        tree.flush()?;
        Ok(())
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    async fn init(&self) -> SyncResult<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.db.open_tree(ASSET_TREE).map(|_| ()))
            .await??;
        Ok(())
    }

    async fn get(&self, collection: &str, key: Option<&str>) -> SyncResult<Option<Value>> {
        let store = self.clone();
        let tree = collection.to_string();
        let key = key.unwrap_or(DEFAULT_KEY).to_string();
        tokio::task::spawn_blocking(move || store.get_blocking(&tree, &key)).await?
    }

    async fn set(&self, collection: &str, value: Value, key: Option<&str>) -> SyncResult<()> {
        let store = self.clone();
        let tree = collection.to_string();
        let key = key.unwrap_or(DEFAULT_KEY).to_string();
        tokio::task::spawn_blocking(move || store.set_blocking(&tree, &key, &value)).await?
    }

    async fn get_asset(&self, name: &str) -> SyncResult<Option<Bytes>> {
        let store = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> SyncResult<Option<Bytes>> {
            let tree = store.db.open_tree(ASSET_TREE)?;
            Ok(tree.get(name.as_bytes())?.map(|v| Bytes::from(v.to_vec())))
        })
        .await?
    }

    async fn set_asset(&self, name: &str, blob: Bytes) -> SyncResult<()> {
        let store = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> SyncResult<()> {
            let tree = store.db.open_tree(ASSET_TREE)?;
            tree.insert(name.as_bytes(), blob.as_ref())?;
            tree.flush()?;
            Ok(())
        })
        .await?
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
