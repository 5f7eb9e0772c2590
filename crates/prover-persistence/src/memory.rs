use crate::entries::{lookup_in, sweep_in, CacheEntry, CacheMap, Lookup};
use crate::{Result, TokenCache};
use parking_lot::Mutex;
use prover_core::{AccessToken, Clock, Identity, SystemClock};
use std::sync::Arc;

/// In-process token cache with the same expiry semantics as the file cache
pub struct MemoryTokenCache {
    entries: Mutex<CacheMap>,
    clock: Arc<dyn Clock>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        MemoryTokenCache {
            entries: Mutex::new(CacheMap::new()),
            clock,
        }
    }

    /// Snapshot of the current mapping
    pub fn entries(&self) -> CacheMap {
        self.entries.lock().clone()
    }
}

impl Default for MemoryTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache for MemoryTokenCache {
    fn lookup(&self, identity: &Identity) -> Result<Option<AccessToken>> {
        let mut entries = self.entries.lock();
        match lookup_in(&mut entries, &identity.cache_key(), self.clock.now()) {
            Lookup::Hit(token) => Ok(Some(token)),
            Lookup::Miss | Lookup::Evicted => Ok(None),
        }
    }

    fn store(&self, identity: &Identity, token: &AccessToken) -> Result<()> {
        let now = self.clock.now();
        self.entries
            .lock()
            .insert(identity.cache_key(), CacheEntry::new(token, now));
        Ok(())
    }

    fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        Ok(sweep_in(&mut self.entries.lock(), now))
    }
}
