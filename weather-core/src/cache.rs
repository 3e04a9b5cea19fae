//! In-process cache for upstream series.
//!
//! Entries expire after a fixed lifespan; once the capacity is reached the
//! least recently used entry is evicted. Failed fetches are never stored.

use std::future::Future;

use cached::{Cached, TimedSizedCache};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub const DEFAULT_TTL_SECS: u64 = 3600;
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: DEFAULT_TTL_SECS, capacity: DEFAULT_CAPACITY }
    }
}

pub struct SeriesCache<V> {
    store: Mutex<TimedSizedCache<String, V>>,
}

impl<V: Clone> SeriesCache<V> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            store: Mutex::new(TimedSizedCache::with_size_and_lifespan(
                config.capacity.max(1),
                config.ttl_secs,
            )),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.store.lock().await.cache_get(key).cloned()
    }

    pub async fn insert(&self, key: String, value: V) {
        self.store.lock().await.cache_set(key, value);
    }

    /// Return the cached value for `key`, or run `fetch` and cache its success.
    ///
    /// The lock is not held while fetching, so two concurrent misses on the
    /// same key both reach upstream and the later one wins.
    pub async fn get_or_try_fetch<F, Fut, E>(&self, key: String, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key).await {
            tracing::debug!("cache hit for {}", key);
            return Ok(hit);
        }

        tracing::debug!("cache miss for {}", key);
        let value = fetch().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }
}

impl<V> std::fmt::Debug for SeriesCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesCache").finish_non_exhaustive()
    }
}
