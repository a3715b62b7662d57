use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::metrics::CACHE_READS;

/// Clock behind every freshness check, injectable so tests can advance
/// time manually instead of sleeping.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock used in production.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Stored value plus its creation timestamp.
///
/// Freshness is decided at read time, so the same stored value can be
/// fresh under one TTL and stale under another.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: i64,
}

/// In-memory TTL cache for one data class.
///
/// Writes are whole-entry replacements; callers store `Arc`s for anything
/// expensive to clone. Process-lifetime only, nothing persists.
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl_ms: i64,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(name: &'static str, ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            ttl_ms,
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn is_fresh(&self, entry: &CacheEntry<V>, ttl_ms: i64) -> bool {
        self.clock.now_ms() - entry.created_at < ttl_ms
    }

    /// Fresh value for `key` under the cache's own TTL.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.get_with_ttl(key, self.ttl_ms).await
    }

    /// Fresh value for `key` under a caller-supplied TTL.
    pub async fn get_with_ttl(&self, key: &K, ttl_ms: i64) -> Option<V> {
        let entries = self.entries.read().await;
        let hit = entries
            .get(key)
            .filter(|entry| self.is_fresh(entry, ttl_ms))
            .map(|entry| entry.value.clone());
        let result = if hit.is_some() { "hit" } else { "miss" };
        CACHE_READS.with_label_values(&[self.name, result]).inc();
        hit
    }

    pub async fn set(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            created_at: self.clock.now_ms(),
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Drops entries stale under the cache's own TTL, returns evicted count.
    ///
    /// Purging is an optimization only; reads already skip stale entries.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let ttl = self.ttl_ms;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now - entry.created_at < ttl);
        before - entries.len()
    }

    /// Removes every entry, returns removed count.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Manually advanced clock for deterministic TTL tests.
#[cfg(test)]
pub struct ManualClock {
    now: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entry_expires_at_ttl_boundary() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache: TtlCache<String, u32> = TtlCache::new("test", 10_000, clock.clone());

        cache.set("k".to_string(), 7).await;
        clock.advance(9_999);
        assert_eq!(cache.get(&"k".to_string()).await, Some(7));

        clock.advance(2);
        assert_eq!(cache.get(&"k".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_read_side_ttl_overrides_bucket_ttl() {
        let clock = Arc::new(ManualClock::new(0));
        let cache: TtlCache<String, u32> = TtlCache::new("test", 10_000, clock.clone());

        cache.set("k".to_string(), 7).await;
        clock.advance(5_000);
        // stale under a tighter caller TTL, fresh under the bucket TTL
        assert_eq!(cache.get_with_ttl(&"k".to_string(), 1_000).await, None);
        assert_eq!(cache.get(&"k".to_string()).await, Some(7));
    }

    #[tokio::test]
    async fn test_purge_drops_only_stale_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let cache: TtlCache<u8, &'static str> = TtlCache::new("test", 1_000, clock.clone());

        cache.set(1, "old").await;
        clock.advance(900);
        cache.set(2, "new").await;
        clock.advance(200);

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&2).await, Some("new"));
    }

    #[tokio::test]
    async fn test_clear_reports_removed_count() {
        let clock = Arc::new(ManualClock::new(0));
        let cache: TtlCache<u8, u8> = TtlCache::new("test", 1_000, clock);
        cache.set(1, 1).await;
        cache.set(2, 2).await;
        assert_eq!(cache.clear().await, 2);
        assert_eq!(cache.len().await, 0);
    }
}
