pub mod client;
pub mod loader;
pub mod memory;
pub mod valkey;

pub use client::{CacheClient, CacheError, CacheResult, ttl_seconds};
pub use loader::CacheLoader;
pub use memory::MemoryCache;
pub use valkey::ValkeyClient;
