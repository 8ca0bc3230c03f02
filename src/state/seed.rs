//! Bundled first-run data
//!
//! Only allow-listed collections are seeded, and only when nothing was ever
//! persisted. Every other collection starts empty.

use super::collections::CollectionKey;
use serde_json::{json, Value};

pub fn seed_value(key: CollectionKey) -> Option<Value> {
    if !key.is_seedable() {
        return None;
    }

    let value = match key {
        CollectionKey::Settings => json!({
            "guest_mode": false,
            "display_name": "Keeper",
            "has_seal_image": false,
        }),
        CollectionKey::CouncilMembers => json!([
            { "id": "council-archivist", "name": "The Archivist", "focus": "memory" },
            { "id": "council-healer", "name": "The Healer", "focus": "health" },
            { "id": "council-steward", "name": "The Steward", "focus": "ledger" },
        ]),
        CollectionKey::LifeDomains => json!([
            { "id": "domain-body", "name": "Body", "score": 50 },
            { "id": "domain-mind", "name": "Mind", "score": 50 },
            { "id": "domain-craft", "name": "Craft", "score": 50 },
            { "id": "domain-kin", "name": "Kin", "score": 50 },
        ]),
        CollectionKey::FlameTokens => json!([
            { "id": "flame-first-light", "label": "First Light", "earned": false },
        ]),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_only_for_allow_list() {
        for key in CollectionKey::ALL {
            assert_eq!(seed_value(key).is_some(), key.is_seedable(), "{}", key);
        }
    }

    #[test]
    fn test_seed_shapes_match_defaults() {
        for key in CollectionKey::ALL {
            if let Some(seed) = seed_value(key) {
                assert_eq!(seed.is_array(), key.default_value().is_array(), "{}", key);
            }
        }
    }
}
