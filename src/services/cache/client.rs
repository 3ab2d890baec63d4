//! Cache client interface used by higher-level services (credential/consumer lookups, rate limits).
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command/serialization).
///
/// Note:
/// - We keep this independent from `AppError` so callers can decide how to fail
///   (fail-closed for authentication lookups, fail-open for rate limits).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
    #[error("cache value error: {0}")]
    InvalidValue(String),
}

/// A minimal, string-based cache interface.
///
/// - Read-through lookups only need `GET` and `SET ... EX`.
/// - Rate limiting needs an atomic counter with a TTL on first use.
///
/// Implementations are shared behind `Arc<dyn CacheClient>`.
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Get UTF-8 string value.
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Set (overwrite) a value with TTL.
    async fn set_string_with_ttl(&self, key: &str, value: &str, ttl: Duration)
    -> CacheResult<()>;

    // Increment an integer counter by `delta`.
    //
    // The TTL is applied when the counter is created by this call; an existing
    // counter keeps its expiry. Returns the value after the increment.
    async fn incr_with_ttl(&self, key: &str, delta: u64, ttl: Duration) -> CacheResult<u64>;
}

/// Convenience helper to build a TTL from seconds.
pub fn ttl_seconds(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}
