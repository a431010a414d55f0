//! Process-local snapshot cache with TTL expiry and tag sweeps.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A cached entry with TTL support.
///
/// The snapshot is wrapped in `Arc` so a hit hands out a cheap clone instead
/// of copying a whole list.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Value>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    /// Create a new cached entry.
    pub fn new(data: Arc<Value>, ttl: Duration) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in the cache.
    pub size: usize,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries removed by TTL expiry or tag sweeps.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Read-through list cache owned by one resource manager.
///
/// Keys are opaque strings; `invalidate` removes every key that contains
/// any of the given tags as a substring. A disabled cache stores nothing and
/// always misses.
#[derive(Debug)]
pub struct ListCache {
    entries: DashMap<String, CachedEntry>,
    ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            enabled: true,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the live snapshot for `key`; expired entries are dropped.
    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        if !self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let hit = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(Arc::clone(&entry.data)),
            Some(entry) => {
                drop(entry);
                if self.entries.remove_if(key, |_, e| e.is_expired()).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
            None => None,
        };

        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "list cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "list cache miss");
        }
        hit
    }

    /// Stores a snapshot under `key` with the cache TTL.
    pub fn set(&self, key: &str, value: Arc<Value>) {
        self.set_with_ttl(key, value, self.ttl);
    }

    pub fn set_with_ttl(&self, key: &str, value: Arc<Value>, ttl: Duration) {
        if !self.enabled {
            return;
        }
        self.entries
            .insert(key.to_string(), CachedEntry::new(value, ttl));
    }

    /// Removes every entry whose key contains any of `tags`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, tags: &[&str]) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            if tags.iter().any(|tag| key.contains(tag)) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        tracing::debug!(tags = ?tags, removed, "list cache invalidated");
        removed
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(v: Value) -> Arc<Value> {
        Arc::new(v)
    }

    #[test]
    fn test_cache_set_and_get() {
        let cache = ListCache::new(Duration::from_secs(300));
        assert!(cache.get("allCategories").is_none());

        cache.set("allCategories", snapshot(json!([{"categoryId": "categoryId0001"}])));
        let hit = cache.get("allCategories").unwrap();
        assert_eq!(hit[0]["categoryId"], "categoryId0001");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_hits_share_the_snapshot() {
        let cache = ListCache::new(Duration::from_secs(300));
        let value = snapshot(json!([]));
        cache.set("allSliders", Arc::clone(&value));
        let hit = cache.get("allSliders").unwrap();
        assert!(Arc::ptr_eq(&hit, &value));
    }

    #[test]
    fn test_expired_entry_is_dropped_on_access() {
        let cache = ListCache::new(Duration::from_secs(300));
        cache.set_with_ttl("allPopups", snapshot(json!([])), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("allPopups").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_by_tag_substring() {
        let cache = ListCache::new(Duration::from_secs(300));
        cache.set("allSliders", snapshot(json!([])));
        cache.set("allSliders?active=true", snapshot(json!([])));
        cache.set("page:1-limit:20", snapshot(json!({})));
        cache.set("page:2-limit:20-active:true", snapshot(json!({})));
        cache.set("allPopups", snapshot(json!([])));

        let removed = cache.invalidate(&["allSliders", "page:"]);
        assert_eq!(removed, 4);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("allPopups").is_some());
    }

    #[test]
    fn test_purge_expired() {
        let cache = ListCache::new(Duration::from_secs(300));
        cache.set_with_ttl("short", snapshot(json!(1)), Duration::ZERO);
        cache.set("long", snapshot(json!(2)));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache = ListCache::disabled();
        cache.set("allCategories", snapshot(json!([])));
        assert!(cache.get("allCategories").is_none());
        assert!(cache.is_empty());
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            size: 0,
            hits: 3,
            misses: 1,
            evictions: 0,
        };
        assert!((stats.hit_rate() - 75.0).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
