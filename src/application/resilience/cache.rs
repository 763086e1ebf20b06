use std::time::Duration;

use ahash::AHashMap;
use parking_lot::RwLock;
use tokio::time::Instant;

/// A cached value and the moment it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub stored_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// In-process cache with a single time-to-live for every entry.
///
/// Expiry is checked on read; nothing is evicted in the background. A store
/// for an existing key replaces the entry wholesale (last write wins). Lock
/// spans cover a single map read or write, never an upstream call.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<AHashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(AHashMap::new()),
        }
    }

    /// Returns the value stored under `key` only if it is still fresh.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            stored_at: Instant::now(),
        };
        self.entries.write().insert(key, entry);
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
