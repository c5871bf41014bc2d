use dashmap::DashMap;
use std::{hash::Hash, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::debug;

/// Entrada del cache con expiración propia
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Concurrent map whose entries each expire after their own TTL.
///
/// Expired entries are invisible to [`get`](TimedCache::get) immediately and are
/// physically removed lazily on access or by [`cleanup_expired`](TimedCache::cleanup_expired).
/// Clones share the same storage.
#[derive(Debug)]
pub struct TimedCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
}

impl<K, V> TimedCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    /// Inserts `value` for `ttl`, replacing (and returning) any live previous value.
    pub fn insert(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        let entry = CacheEntry::new(value, ttl);
        self.data
            .insert(key, entry)
            .filter(|old| !old.is_expired())
            .map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.data.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.data.remove_if(key, |_, e| e.is_expired());
                None
            } else {
                Some(entry.value.clone())
            }
        } else {
            None
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.data
            .remove(key)
            .filter(|(_, e)| !e.is_expired())
            .map(|(_, e)| e.value)
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }
}

impl<K, V> Default for TimedCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for TimedCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entry_is_visible_until_its_ttl_elapses() {
        let cache = TimedCache::new();
        cache.insert("u1".to_string(), "bark".to_string(), Duration::from_secs(32));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get(&"u1".to_string()).as_deref(), Some("bark"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"u1".to_string()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_independently() {
        let cache = TimedCache::new();
        cache.insert(1u8, "short", Duration::from_secs(1));
        cache.insert(2u8, "long", Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some("long"));
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_refreshes_the_ttl() {
        let cache = TimedCache::new();
        cache.insert("k", 1, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.insert("k", 2, Duration::from_secs(10)), Some(1));
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get(&"k"), Some(2));
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let cache = TimedCache::new();
        let other = cache.clone();
        cache.insert("a", 1, Duration::from_secs(60));

        assert_eq!(other.remove(&"a"), Some(1));
        assert!(cache.is_empty());
    }
}
