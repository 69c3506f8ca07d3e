//! Single-flight TTL cache
//!
//! Each key owns one async slot; an expired key is refreshed by exactly
//! one in-flight loader while concurrent callers await that slot instead
//! of issuing duplicate loads. Cancelling a waiting or loading caller
//! drops its mutex guard, so the slot is never left locked.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Slot<V> {
    value: Option<(V, Instant)>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self { value: None }
    }
}

/// TTL cache with per-key single-flight refresh
pub struct SingleFlightCache<K, V> {
    slots: Mutex<HashMap<K, Arc<Mutex<Slot<V>>>>>,
    ttl: Duration,
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Return the cached value for `key`, or run `loader` to refresh it
    ///
    /// The outer map lock is held only long enough to resolve the slot;
    /// the per-key slot lock is held across the load, which is what makes
    /// the refresh single-flight. Loader failures are not cached.
    pub async fn get_or_load<F, Fut, E>(&self, key: K, loader: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<V, E>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key).or_default())
        };

        let mut guard = slot.lock().await;
        if let Some((value, stored_at)) = &guard.value {
            if stored_at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
        }

        let value = loader().await?;
        guard.value = Some((value.clone(), Instant::now()));
        Ok(value)
    }

    /// Drop the cached value for `key`, if any
    pub async fn invalidate(&self, key: &K) {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(key).cloned()
        };
        if let Some(slot) = slot {
            slot.lock().await.value = None;
        }
    }

    /// Number of keys with a slot (fresh or stale)
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
