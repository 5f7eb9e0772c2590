use chrono::{DateTime, Utc};
use prover_core::AccessToken;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted form of one cached token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Raw compact token
    pub jwt: String,

    /// When the entry was written, epoch milliseconds
    pub timestamp: i64,
}

impl CacheEntry {
    pub fn new(token: &AccessToken, saved_at: DateTime<Utc>) -> Self {
        CacheEntry {
            jwt: token.as_str().to_string(),
            timestamp: saved_at.timestamp_millis(),
        }
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Whole-cache mapping from cache key to entry
pub type CacheMap = BTreeMap<String, CacheEntry>;

pub(crate) enum Lookup {
    Hit(AccessToken),
    Miss,
    /// Entry existed but was expired or malformed and has been removed
    Evicted,
}

pub(crate) fn lookup_in(map: &mut CacheMap, key: &str, now: DateTime<Utc>) -> Lookup {
    let Some(entry) = map.get(key) else {
        return Lookup::Miss;
    };

    match AccessToken::parse(entry.jwt.clone()) {
        Ok(token) if token.is_valid_at(now) => Lookup::Hit(token),
        _ => {
            map.remove(key);
            Lookup::Evicted
        }
    }
}

pub(crate) fn sweep_in(map: &mut CacheMap, now: DateTime<Utc>) -> usize {
    let before = map.len();
    map.retain(|_, entry| AccessToken::raw_is_valid_at(&entry.jwt, now));
    before - map.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::raw_token;

    #[test]
    fn test_entry_json_shape() {
        let entry = CacheEntry {
            jwt: "a.b.c".to_string(),
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"jwt": "a.b.c", "timestamp": 1_700_000_000_000i64}));
        assert_eq!(entry.saved_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_sweep_keeps_only_valid() {
        let now = Utc::now();
        let mut map = CacheMap::new();
        map.insert("fresh".into(), CacheEntry { jwt: raw_token(now.timestamp() + 3600), timestamp: 0 });
        map.insert("stale".into(), CacheEntry { jwt: raw_token(now.timestamp() - 1), timestamp: 0 });
        map.insert("junk".into(), CacheEntry { jwt: "not-a-token".into(), timestamp: 0 });

        assert_eq!(sweep_in(&mut map, now), 2);
        assert!(map.contains_key("fresh"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_lookup_evicts_stale_entry() {
        let now = Utc::now();
        let mut map = CacheMap::new();
        map.insert("k".into(), CacheEntry { jwt: raw_token(now.timestamp() + 60), timestamp: 0 });

        assert!(matches!(lookup_in(&mut map, "k", now), Lookup::Evicted));
        assert!(map.is_empty());
        assert!(matches!(lookup_in(&mut map, "k", now), Lookup::Miss));
    }
}
