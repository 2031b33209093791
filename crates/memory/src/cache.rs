//! In-process TTL cache using moka.
//!
//! TinyLFU admission, bounded entry count, and a per-entry TTL chosen by
//! the caller at insert time.

use moka::Expiry;
use moka::sync::Cache;
use querylens_core::CacheService;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CachedValue {
    value: serde_json::Value,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Shared analysis cache for profiles and extraction results.
pub struct MokaCache {
    cache: Cache<String, CachedValue>,
}

impl MokaCache {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Number of entries currently in the cache (eventually consistent).
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl CacheService for MokaCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.cache.get(key).map(|entry| entry.value)
    }

    fn set(&self, key: String, value: serde_json::Value, ttl: Duration) {
        self.cache.insert(key, CachedValue { value, ttl });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_and_get() {
        let cache = MokaCache::new(100);
        cache.set("profile:abc".into(), json!({"intent": "trend"}), Duration::from_secs(60));
        assert_eq!(cache.get("profile:abc"), Some(json!({"intent": "trend"})));
    }

    #[test]
    fn miss_returns_none() {
        let cache = MokaCache::new(100);
        assert_eq!(cache.get("nonexistent"), None);
    }

    #[test]
    fn entries_expire_after_their_ttl() {
        let cache = MokaCache::new(100);
        cache.set("short".into(), json!(1), Duration::from_millis(30));
        cache.set("long".into(), json!(2), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long"), Some(json!(2)));
    }

    #[test]
    fn clear_empties_cache() {
        let cache = MokaCache::new(100);
        cache.set("a".into(), json!(1), Duration::from_secs(60));
        cache.clear();
        assert_eq!(cache.get("a"), None);
    }
}
