//! Process-wide response cache for read tools.
//!
//! Keys are sha-256 digests over the canonicalized `(tool, arguments)`
//! pair, so permutations of JSON object key order hit the same entry. The
//! cache is never consulted for writes or for the reflection pipeline.

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::trace;

/// An entry with its insertion time for TTL checks.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// LRU + TTL response cache.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    stats: Mutex<CacheStats>,
}

impl ResponseCache {
    /// Create a cache with the given capacity and TTL.
    #[must_use]
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Compute the cache key for a tool call.
    #[must_use]
    pub fn key(tool: &str, arguments: &Value) -> String {
        let canonical = canonicalize(arguments);
        let mut hasher = Sha256::new();
        hasher.update(tool.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(canonical.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a cached response; expired entries are evicted on probe.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if entry.stored_at.elapsed() <= self.ttl {
                trace!(key, "response cache hit");
                self.stats.lock().hits += 1;
                return Some(entry.value.clone());
            }
            entries.pop(key);
        }
        self.stats.lock().misses += 1;
        None
    }

    /// Store a response.
    pub fn put(&self, key: String, value: Value) {
        self.entries.lock().put(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Current hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }

    /// Number of live entries (expired ones included until probed).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rebuild a JSON value with object keys in sorted order at every level.
///
/// `serde_json` maps already iterate sorted, but canonicalizing explicitly
/// keeps the key stable even if the crate is built with `preserve_order`.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(inner) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(inner));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_ignores_object_key_order() {
        let a = json!({"task": "fix", "language": "rust", "nested": {"x": 1, "y": 2}});
        let b = json!({"nested": {"y": 2, "x": 1}, "language": "rust", "task": "fix"});
        assert_eq!(
            ResponseCache::key("apex_patterns_lookup", &a),
            ResponseCache::key("apex_patterns_lookup", &b)
        );
    }

    #[test]
    fn test_key_distinguishes_tools_and_args() {
        let args = json!({"task": "fix"});
        assert_ne!(
            ResponseCache::key("apex_patterns_lookup", &args),
            ResponseCache::key("apex_patterns_discover", &args)
        );
        assert_ne!(
            ResponseCache::key("apex_patterns_lookup", &args),
            ResponseCache::key("apex_patterns_lookup", &json!({"task": "other"}))
        );
    }

    #[test]
    fn test_get_put_round_trip() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        let key = ResponseCache::key("t", &json!({"a": 1}));
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), json!({"result": true}));
        assert_eq!(cache.get(&key).unwrap(), json!({"result": true}));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = ResponseCache::new(10, Duration::from_millis(0));
        let key = ResponseCache::key("t", &json!({}));
        cache.put(key.clone(), json!(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_lru_eviction_respects_capacity() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        for i in 0..4 {
            cache.put(format!("k{i}"), json!(i));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("k0").is_none());
        assert!(cache.get("k3").is_some());
    }
}
