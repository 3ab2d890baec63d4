use async_trait::async_trait;
use moka::{Expiry, future::Cache, ops::compute::Op};
use std::time::{Duration, Instant};

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};

/// Upper bound on stored entries; the least useful ones are evicted beyond it.
pub const DEFAULT_MAX_ENTRIES: u64 = 100_000;

/// In-process cache with per-entry TTL.
///
/// Used when no `VALKEY_URL` is configured (single instance deployments, local
/// development) and by tests. Expired entries are evicted by moka's
/// housekeeping, whether or not their key is ever read again.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Each entry carries its own deadline; updates keep it (counter windows).
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, created_at: Instant) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(updated_at))
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .build();
        Self { entries }
    }

    /// Number of stored entries, after pending evictions have run.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry, forcing subsequent lookups to miss.
    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .await
            .filter(|e| e.is_live(now))
            .map(|e| e.value))
    }

    async fn set_string_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, delta: u64, ttl: Duration) -> CacheResult<u64> {
        let now = Instant::now();
        let mut counted = 0;
        let mut failure = None;

        // compute runs under the entry's lock, so concurrent increments serialize
        self.entries
            .entry(key.to_string())
            .and_compute_with(|current| {
                let live = current.map(|e| e.into_value()).filter(|e| e.is_live(now));
                let op = match live {
                    Some(entry) => match entry.value.parse::<u64>() {
                        Ok(n) => {
                            counted = n + delta;
                            Op::Put(Entry {
                                value: counted.to_string(),
                                expires_at: entry.expires_at,
                            })
                        }
                        Err(e) => {
                            failure = Some(CacheError::InvalidValue(e.to_string()));
                            Op::Nop
                        }
                    },
                    None => {
                        counted = delta;
                        Op::Put(Entry {
                            value: delta.to_string(),
                            expires_at: now + ttl,
                        })
                    }
                };
                std::future::ready(op)
            })
            .await;

        match failure {
            Some(err) => Err(err),
            None => Ok(counted),
        }
    }
}
