//! Persistence adapter contract
//!
//! Each call is atomic for its single key. There is no multi-key transaction:
//! callers that need several collections written issue several calls.

use crate::error::SyncResult;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

/// Key used when a caller does not address a specific entry inside a collection
pub const DEFAULT_KEY: &str = "current";

/// Tree holding binary assets (e.g. the user's seal image)
pub const ASSET_TREE: &str = "assets";

#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Open or prepare the underlying storage
    async fn init(&self) -> SyncResult<()>;

    /// Read a collection value. `None` key addresses [`DEFAULT_KEY`].
    async fn get(&self, collection: &str, key: Option<&str>) -> SyncResult<Option<Value>>;

    /// Overwrite a collection value. `None` key addresses [`DEFAULT_KEY`].
    async fn set(&self, collection: &str, value: Value, key: Option<&str>) -> SyncResult<()>;

    /// Read a binary asset
    async fn get_asset(&self, name: &str) -> SyncResult<Option<Bytes>>;

    /// Overwrite a binary asset
    async fn set_asset(&self, name: &str, blob: Bytes) -> SyncResult<()>;

    /// Short label for logs and status output
    fn backend_name(&self) -> &'static str;
}
