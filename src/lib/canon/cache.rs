use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Bounded string-to-string cache with least-recently-used eviction,
/// shared across pipeline runs for the process lifetime.
pub struct BoundedCache {
    inner: Mutex<LruCache<String, String>>,
}

impl BoundedCache {
    pub fn new(capacity: usize) -> BoundedCache {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        BoundedCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: String, value: String) {
        self.inner.lock().unwrap().put(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
