//! Bounded audit history of hard-save runs
//!
//! Entries live in the `build_metrics` collection (oldest first) and are
//! persisted by the normal flush path. They are never modified after append.

use crate::state::{CollectionKey, StateRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_BUILD_METRIC_CAP: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildMetric {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BuildMetric {
    pub fn new(success: bool, duration_ms: u64, error_message: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            success,
            duration_ms,
            error_message,
        }
    }
}

#[derive(Clone)]
pub struct BuildMetricLog {
    registry: StateRegistry,
    cap: usize,
}

impl BuildMetricLog {
    pub fn new(registry: StateRegistry, cap: usize) -> Self {
        Self {
            registry,
            cap: cap.max(1),
        }
    }

    /// Append a metric, dropping the oldest entries beyond the cap
    pub fn record(&self, metric: BuildMetric) {
        let entry = match serde_json::to_value(&metric) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!("Failed to encode build metric {}: {}", metric.id, e);
                return;
            }
        };
        let cap = self.cap;

        self.registry.mutate(CollectionKey::BuildMetrics, move |value| {
            if !value.is_array() {
                *value = Value::Array(Vec::new());
            }
            if let Some(list) = value.as_array_mut() {
                list.push(entry);
                if list.len() > cap {
                    let excess = list.len() - cap;
                    list.drain(0..excess);
                }
            }
        });
    }

    /// All recorded metrics, oldest first
    pub fn entries(&self) -> Vec<BuildMetric> {
        self.registry
            .get(CollectionKey::BuildMetrics)
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn latest(&self) -> Option<BuildMetric> {
        self.entries().pop()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}
