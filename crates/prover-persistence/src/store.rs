use crate::entries::{lookup_in, sweep_in, CacheEntry, CacheMap, Lookup};
use crate::{CacheError, Result, TokenCache};
use parking_lot::Mutex;
use prover_core::{AccessToken, Clock, Identity, SystemClock};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Token cache persisted as a single JSON object on disk.
///
/// Every mutation rewrites the whole file through a temp file and rename,
/// so a crash mid-write leaves the previous contents intact.
pub struct FileTokenCache {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write cycles across identities
    lock: Mutex<()>,
}

impl FileTokenCache {
    /// Open a cache at `path`; the file is created on first write
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        FileTokenCache {
            path: path.into(),
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole mapping. A missing file is empty; a corrupt one is
    /// reported and treated as empty so the next write replaces it.
    pub fn load(&self) -> Result<CacheMap> {
        if !self.path.exists() {
            return Ok(CacheMap::new());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(CacheMap::new());
        }

        match serde_json::from_str::<CacheMap>(&contents) {
            Ok(map) => {
                debug!("Loaded token cache with {} entries", map.len());
                Ok(map)
            }
            Err(e) => {
                warn!("Token cache at {:?} is unreadable, starting empty: {}", self.path, e);
                Ok(CacheMap::new())
            }
        }
    }

    fn save(&self, map: &CacheMap) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(map)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| CacheError::PersistError(e.to_string()))?;

        debug!("Token cache saved ({} entries)", map.len());
        Ok(())
    }
}

impl TokenCache for FileTokenCache {
    fn lookup(&self, identity: &Identity) -> Result<Option<AccessToken>> {
        let _guard = self.lock.lock();
        let mut map = self.load()?;
        let key = identity.cache_key();

        match lookup_in(&mut map, &key, self.clock.now()) {
            Lookup::Hit(token) => {
                debug!(
                    worker_id = identity.worker_id(),
                    expires_at = %token.expires_at(),
                    "Using cached token"
                );
                Ok(Some(token))
            }
            Lookup::Evicted => {
                info!(worker_id = identity.worker_id(), "Cached token expired, evicting");
                self.save(&map)?;
                Ok(None)
            }
            Lookup::Miss => {
                debug!(worker_id = identity.worker_id(), "No cached token");
                Ok(None)
            }
        }
    }

    fn store(&self, identity: &Identity, token: &AccessToken) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.load()?;
        map.insert(identity.cache_key(), CacheEntry::new(token, self.clock.now()));
        self.save(&map)?;

        info!(
            worker_id = identity.worker_id(),
            expires_at = %token.expires_at(),
            "Token cached"
        );
        Ok(())
    }

    fn sweep_expired(&self) -> Result<usize> {
        let _guard = self.lock.lock();
        let mut map = self.load()?;
        let original = map.len();
        let removed = sweep_in(&mut map, self.clock.now());

        if removed > 0 {
            self.save(&map)?;
        }

        info!("Token cache sweep removed {} of {} entries", removed, original);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{identity, raw_token, token, KEY_A, KEY_B};
    use chrono::{Duration, Utc};
    use prover_core::ManualClock;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir, clock: Arc<ManualClock>) -> FileTokenCache {
        FileTokenCache::with_clock(dir.path().join("jwt_cache.json"), clock)
    }

    #[test]
    fn test_store_then_lookup() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let cache = cache_in(&dir, Arc::new(ManualClock::new(now)));
        let id = identity("w1", KEY_A);
        let t1 = token(now.timestamp() + 3600);

        assert!(cache.lookup(&id).unwrap().is_none());
        cache.store(&id, &t1).unwrap();
        assert_eq!(cache.lookup(&id).unwrap(), Some(t1));
    }

    #[test]
    fn test_lookup_after_expiry_evicts_from_disk() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let cache = cache_in(&dir, clock.clone());
        let id = identity("w1", KEY_A);

        cache.store(&id, &token(now.timestamp() + 3600)).unwrap();
        clock.advance(Duration::hours(2));

        assert!(cache.lookup(&id).unwrap().is_none());
        assert!(!cache.load().unwrap().contains_key(&id.cache_key()));
    }

    #[test]
    fn test_store_overwrites_and_keeps_other_identities() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let cache = cache_in(&dir, Arc::new(ManualClock::new(now)));
        let a = identity("w1", KEY_A);
        let b = identity("w2", KEY_B);

        cache.store(&a, &token(now.timestamp() + 1000)).unwrap();
        cache.store(&b, &token(now.timestamp() + 2000)).unwrap();
        let newer = token(now.timestamp() + 5000);
        cache.store(&a, &newer).unwrap();

        let map = cache.load().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(cache.lookup(&a).unwrap(), Some(newer));
        assert!(cache.lookup(&b).unwrap().is_some());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let cache = cache_in(&dir, Arc::new(ManualClock::new(now)));

        let mut map = CacheMap::new();
        map.insert("live".into(), CacheEntry { jwt: raw_token(now.timestamp() + 3600), timestamp: 0 });
        map.insert("dead".into(), CacheEntry { jwt: raw_token(now.timestamp() + 10), timestamp: 0 });
        map.insert("two-part".into(), CacheEntry { jwt: "a.b".into(), timestamp: 0 });
        cache.save(&map).unwrap();

        assert_eq!(cache.sweep_expired().unwrap(), 2);
        let remaining = cache.load().unwrap();
        assert_eq!(remaining.keys().collect::<Vec<_>>(), vec!["live"]);
    }

    #[test]
    fn test_corrupt_file_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let cache = cache_in(&dir, Arc::new(ManualClock::new(now)));
        std::fs::write(cache.path(), "{ not json").unwrap();

        assert!(cache.load().unwrap().is_empty());

        let id = identity("w1", KEY_A);
        cache.store(&id, &token(now.timestamp() + 3600)).unwrap();
        assert_eq!(cache.load().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_stores_for_distinct_identities() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let cache = Arc::new(cache_in(&dir, Arc::new(ManualClock::new(now))));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let id = identity(&format!("w{}", i), KEY_A);
                    cache.store(&id, &token(now.timestamp() + 3600)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.load().unwrap().len(), 8);
    }
}
