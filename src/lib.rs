//! Vaultkeep - local-first state persistence
//!
//! Keeps a set of named collections in memory, persists them in the
//! background with a trailing debounce, offers a user-invoked hard save with
//! an audit trail, takes periodic full-state snapshots and gates sensitive
//! views behind a hold-to-confirm ritual.

pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod memory;
pub mod notifications;
pub mod observability;
pub mod state;
pub mod sync;
pub mod utils;
pub mod vault;

pub use config::EngineConfig;
pub use engine::{EngineStatus, StartupReport, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use gate::{AccessGate, GateState, HoldRitual, NavigationDecision, UnlockTick, ViewId};
pub use memory::{InMemoryAdapter, MemoryStore, PersistenceAdapter};
pub use notifications::{Toast, ToastLevel, ToastQueue};
pub use state::{CollectionKey, RegistrySnapshot, StateRegistry};
pub use vault::{BuildMetric, HardSaveOutcome, VaultItem};
