//! Response cache with a fixed TTL.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

/// A small TTL cache for decoded API responses.
///
/// Entries are never refreshed in place; callers clear the whole cache when
/// anything they hold may have gone stale. Clones share storage.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<RwLock<CacheInner>>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                entries: HashMap::new(),
                ttl,
            })),
        }
    }

    /// Get a cached value by key, returning None if expired or missing.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.write().ok()?;
        let ttl = inner.ttl;

        let fresh = inner
            .entries
            .get(key)
            .map(|entry| entry.inserted_at.elapsed() < ttl)?;
        if fresh {
            tracing::debug!(key, "Using cached response");
            inner.entries.get(key).map(|entry| entry.value.clone())
        } else {
            inner.entries.remove(key);
            None
        }
    }

    /// Insert a value, dropping any expired entries first.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };
        let ttl = inner.ttl;
        inner.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        inner.entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Clear all entries.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.entries.clear();
        }
        tracing::debug!("Response cache cleared");
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
