//! # TTL Cache
//!
//! Short-lived read-through cache for the per-sebo book list.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get(k)         → Some(Arc<V>) while now - inserted_at < ttl            │
//! │  insert(k, v)   → replaces the whole snapshot (never mutated in place)  │
//! │  invalidate(k)  → called by every write in that sebo BEFORE it returns  │
//! │                                                                         │
//! │  Reads clone an Arc under a shared lock; writers take the lock only    │
//! │  to swap map entries.                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

struct Entry<V> {
    value: Arc<V>,
    inserted_at: Instant,
}

/// Keyed cache whose entries expire `ttl` after insertion.
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        TtlCache {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if it has not expired.
    pub async fn get(&self, key: &K) -> Option<Arc<V>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries.get(key).and_then(|entry| {
            if now.duration_since(entry.inserted_at) < self.ttl {
                Some(Arc::clone(&entry.value))
            } else {
                None
            }
        })
    }

    /// Stores a fresh snapshot and returns it.
    pub async fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let entry = Entry {
            value: Arc::clone(&value),
            inserted_at: self.clock.now(),
        };
        self.entries.write().await.insert(key, entry);
        value
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache").field("ttl", &self.ttl).finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (TtlCache<String, Vec<i32>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::with_clock(Duration::from_secs(30), clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let (cache, clock) = cache();
        cache.insert("s1".to_string(), vec![1, 2]).await;

        clock.advance(Duration::from_secs(29));
        assert_eq!(cache.get(&"s1".to_string()).await.as_deref(), Some(&vec![1, 2]));
    }

    #[tokio::test]
    async fn test_expires_after_ttl() {
        let (cache, clock) = cache();
        cache.insert("s1".to_string(), vec![1]).await;

        clock.advance(Duration::from_secs(30));
        assert!(cache.get(&"s1".to_string()).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_is_per_key() {
        let (cache, _clock) = cache();
        cache.insert("s1".to_string(), vec![1]).await;
        cache.insert("s2".to_string(), vec![2]).await;

        cache.invalidate(&"s1".to_string()).await;

        assert!(cache.get(&"s1".to_string()).await.is_none());
        assert!(cache.get(&"s2".to_string()).await.is_some());
    }

    #[tokio::test]
    async fn test_old_snapshot_survives_replacement() {
        let (cache, _clock) = cache();
        let old = cache.insert("s1".to_string(), vec![1]).await;
        cache.insert("s1".to_string(), vec![1, 2]).await;

        assert_eq!(*old, vec![1]);
        assert_eq!(cache.get(&"s1".to_string()).await.unwrap().len(), 2);
    }
}
