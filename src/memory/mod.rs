//! Persistence layer
//! Collections are JSON values addressed by (collection, key); binary assets
//! live in their own namespace.
//!
//! - `store` - sled-backed on-device store (default)
//! - `in_memory` - map-backed store for degraded mode and tests

pub mod adapter;
pub mod in_memory;
pub mod store;

pub use adapter::{PersistenceAdapter, ASSET_TREE, DEFAULT_KEY};
pub use in_memory::InMemoryAdapter;
pub use store::MemoryStore;
