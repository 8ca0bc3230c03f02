//! Disaster recovery: snapshots, hard save and its audit trail

pub mod build_metrics;
pub mod hard_save;
pub mod snapshot;

pub use build_metrics::{BuildMetric, BuildMetricLog, DEFAULT_BUILD_METRIC_CAP};
pub use hard_save::{HardSaveOutcome, HardSaveProtocol};
pub use snapshot::{
    vault_items_from, SnapshotService, VaultItem, DEFAULT_AUTO_SNAPSHOT_INTERVAL_HOURS,
};
