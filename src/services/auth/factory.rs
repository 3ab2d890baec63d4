//! Factory: build `JwtAuthenticator` from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::repos::AuthStore;
use crate::services::auth::{
    JwtAuthenticator, consumers::ConsumerResolver, credentials::CredentialResolver,
};
use crate::services::cache::{CacheClient, ttl_seconds};

pub fn build_authenticator(
    config: &Config,
    cache: Arc<dyn CacheClient>,
    store: Arc<dyn AuthStore>,
) -> Arc<JwtAuthenticator> {
    let ttl = ttl_seconds(config.cache_ttl_seconds);
    let prefix = config.cache_key_prefix.as_str();

    let credentials = CredentialResolver::new(cache.clone(), store.clone(), prefix, ttl);
    let consumers = ConsumerResolver::new(cache, store, prefix, ttl);

    Arc::new(JwtAuthenticator::new(
        config.jwt.clone(),
        credentials,
        consumers,
    ))
}
