//! Collection identifiers and their persisted names
//!
//! The persisted names are stable across versions; renaming a variant must
//! never change its `as_str()`.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Name of the asset holding the user-uploaded seal image
pub const SEAL_IMAGE_ASSET: &str = "seal_image";

/// Collection for scalar bookkeeping values kept outside the collection set
pub const META_COLLECTION: &str = "meta";
pub const LAST_AUTO_SNAPSHOT_KEY: &str = "last_auto_snapshot";
pub const FIRST_RUN_COMPLETED_KEY: &str = "first_run_completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKey {
    Settings,
    Sessions,
    Memories,
    HealthReadings,
    Projects,
    Ledger,
    VaultItems,
    LifeEvents,
    MoodLog,
    LifeDomains,
    DreamLog,
    CompanionMemories,
    CouncilMembers,
    FlameTokens,
    BuildMetrics,
}

impl CollectionKey {
    pub const ALL: [CollectionKey; 15] = [
        CollectionKey::Settings,
        CollectionKey::Sessions,
        CollectionKey::Memories,
        CollectionKey::HealthReadings,
        CollectionKey::Projects,
        CollectionKey::Ledger,
        CollectionKey::VaultItems,
        CollectionKey::LifeEvents,
        CollectionKey::MoodLog,
        CollectionKey::LifeDomains,
        CollectionKey::DreamLog,
        CollectionKey::CompanionMemories,
        CollectionKey::CouncilMembers,
        CollectionKey::FlameTokens,
        CollectionKey::BuildMetrics,
    ];

    /// Persisted collection name
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKey::Settings => "settings",
            CollectionKey::Sessions => "sessions",
            CollectionKey::Memories => "memories",
            CollectionKey::HealthReadings => "health_readings",
            CollectionKey::Projects => "projects",
            CollectionKey::Ledger => "ledger",
            CollectionKey::VaultItems => "vault_items",
            CollectionKey::LifeEvents => "life_events",
            CollectionKey::MoodLog => "mood_log",
            CollectionKey::LifeDomains => "life_domains",
            CollectionKey::DreamLog => "dream_log",
            CollectionKey::CompanionMemories => "companion_memories",
            CollectionKey::CouncilMembers => "council_members",
            CollectionKey::FlameTokens => "flame_tokens",
            CollectionKey::BuildMetrics => "build_metrics",
        }
    }

    /// Settings carry the seal image as a binary asset next to the JSON value
    pub fn is_asset_backed(&self) -> bool {
        matches!(self, CollectionKey::Settings)
    }

    /// Collections that may fall back to bundled seed data on the very first run
    pub fn is_seedable(&self) -> bool {
        matches!(
            self,
            CollectionKey::Settings
                | CollectionKey::CouncilMembers
                | CollectionKey::LifeDomains
                | CollectionKey::FlameTokens
        )
    }

    /// Excluded from snapshot payloads so a vault item never nests older captures
    pub fn is_snapshot_excluded(&self) -> bool {
        matches!(self, CollectionKey::VaultItems | CollectionKey::BuildMetrics)
    }

    /// Empty value used when nothing is persisted and no seed applies
    pub fn default_value(&self) -> Value {
        match self {
            CollectionKey::Settings => json!({}),
            _ => json!([]),
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKey {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectionKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| SyncError::UnknownCollection(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persisted_names_parse_back() {
        for key in CollectionKey::ALL {
            assert_eq!(key.as_str().parse::<CollectionKey>().unwrap(), key);
        }
        assert!("notes".parse::<CollectionKey>().is_err());
    }

    #[test]
    fn test_serde_uses_persisted_names() {
        let json = serde_json::to_string(&CollectionKey::HealthReadings).unwrap();
        assert_eq!(json, "\"health_readings\"");
    }

    #[test]
    fn test_only_settings_is_asset_backed() {
        let backed: Vec<_> = CollectionKey::ALL
            .iter()
            .filter(|k| k.is_asset_backed())
            .collect();
        assert_eq!(backed, vec![&CollectionKey::Settings]);
    }
}
