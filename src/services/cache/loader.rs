//! Read-through cache on top of [`CacheClient`].
//!
//! Values are stored as JSON-encoded `Option<V>` so a "not found" answer from
//! the loader is cached as well (`null`), which keeps repeated lookups of the
//! same missing key away from the store. Loader errors are never cached.
//!
//! There is no single-flight: concurrent misses for the same key may each run
//! the loader.
use std::{fmt::Display, future::Future, marker::PhantomData, sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::services::cache::client::{CacheClient, CacheError};

pub struct CacheLoader<K: ?Sized, V> {
    cache: Arc<dyn CacheClient>,
    namespace: String,
    ttl: Duration,
    _marker: PhantomData<fn(&K) -> V>,
}

impl<K: ?Sized, V> Clone for CacheLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            namespace: self.namespace.clone(),
            ttl: self.ttl,
            _marker: PhantomData,
        }
    }
}

impl<K: ?Sized, V> std::fmt::Debug for CacheLoader<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLoader")
            .field("backend", &self.cache.backend_name())
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<K, V> CacheLoader<K, V>
where
    K: Display + ?Sized,
    V: Serialize + DeserializeOwned,
{
    pub fn new(cache: Arc<dyn CacheClient>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            ttl,
            _marker: PhantomData,
        }
    }

    /// Namespaced cache key, e.g. `jwt-gateway:jwt_secrets:<key>`.
    pub fn cache_key(&self, key: &K) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Return the cached value for `key`, or run `load` and cache its result.
    ///
    /// - `Ok(Some(v))` / `Ok(None)`: found / known to be absent (either may come from cache)
    /// - `Err(_)`: cache backend failure or loader failure
    pub async fn get_or_load<E, F, Fut>(&self, key: &K, load: F) -> Result<Option<V>, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        let cache_key = self.cache_key(key);

        if let Some(raw) = self.cache.get_string(&cache_key).await? {
            match serde_json::from_str::<Option<V>>(&raw) {
                Ok(value) => {
                    debug!(key = %cache_key, "cache hit");
                    return Ok(value);
                }
                Err(err) => {
                    // Unreadable entry (e.g. written by an older build): reload and overwrite.
                    warn!(key = %cache_key, error = %err, "discarding undecodable cache entry");
                }
            }
        }

        debug!(key = %cache_key, "cache miss");
        let value = load().await?;

        let raw =
            serde_json::to_string(&value).map_err(|e| CacheError::InvalidValue(e.to_string()))?;
        self.cache
            .set_string_with_ttl(&cache_key, &raw, self.ttl)
            .await?;

        Ok(value)
    }
}
