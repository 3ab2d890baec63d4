use std::{sync::Arc, time::Duration};

use crate::repos::AuthStore;
use crate::services::auth::{outcome::AuthError, types::JwtCredential};
use crate::services::cache::{CacheClient, CacheLoader};

/// Maps the key claim of a token to its stored signing credential.
#[derive(Clone)]
pub struct CredentialResolver {
    loader: CacheLoader<str, JwtCredential>,
    store: Arc<dyn AuthStore>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("loader", &self.loader)
            .finish()
    }
}

impl CredentialResolver {
    pub fn new(
        cache: Arc<dyn CacheClient>,
        store: Arc<dyn AuthStore>,
        prefix: &str,
        ttl: Duration,
    ) -> Self {
        Self {
            loader: CacheLoader::new(cache, format!("{prefix}:jwt_secrets"), ttl),
            store,
        }
    }

    /// `Ok(None)`: no credential is registered under `key` (cached like a hit).
    pub async fn resolve(&self, key: &str) -> Result<Option<JwtCredential>, AuthError> {
        self.loader
            .get_or_load(key, || async {
                self.store
                    .find_credential_by_key(key)
                    .await
                    .map_err(AuthError::from)
            })
            .await
    }

    pub fn cache_key(&self, key: &str) -> String {
        self.loader.cache_key(key)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::repos::MemoryAuthStore;
    use crate::services::auth::types::JwtAlgorithm;
    use crate::services::cache::MemoryCache;

    fn setup() -> (Arc<MemoryCache>, Arc<MemoryAuthStore>, CredentialResolver) {
        let cache = Arc::new(MemoryCache::new());
        let store = Arc::new(MemoryAuthStore::new());
        let resolver = CredentialResolver::new(
            cache.clone(),
            store.clone(),
            "test",
            Duration::from_secs(60),
        );
        (cache, store, resolver)
    }

    fn credential(key: &str) -> JwtCredential {
        JwtCredential {
            id: Uuid::new_v4(),
            consumer_id: Uuid::new_v4(),
            key: key.into(),
            algorithm: JwtAlgorithm::Hs256,
            secret: Some("secret".into()),
            public_key: None,
        }
    }

    #[tokio::test]
    async fn resolves_through_the_cache() {
        let (cache, store, resolver) = setup();
        let expected = credential("issuer-a");
        store.insert_credential(expected.clone());

        assert_eq!(resolver.resolve("issuer-a").await.unwrap(), Some(expected.clone()));
        assert_eq!(resolver.resolve("issuer-a").await.unwrap(), Some(expected.clone()));
        assert_eq!(store.lookups(), 1);

        // A forced miss reloads the same value.
        cache.clear().await;
        assert_eq!(resolver.resolve("issuer-a").await.unwrap(), Some(expected));
        assert_eq!(store.lookups(), 2);
    }

    #[tokio::test]
    async fn unknown_key_is_cached_as_absent() {
        let (_cache, store, resolver) = setup();

        assert_eq!(resolver.resolve("nobody").await.unwrap(), None);
        assert_eq!(resolver.resolve("nobody").await.unwrap(), None);
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn store_failure_is_fatal_and_not_cached() {
        let (cache, store, resolver) = setup();
        store.set_failing(true);

        let err = resolver.resolve("issuer-a").await.unwrap_err();
        assert!(matches!(err, AuthError::Store(_)));
        assert!(cache.is_empty().await);

        store.set_failing(false);
        store.insert_credential(credential("issuer-a"));
        assert!(resolver.resolve("issuer-a").await.unwrap().is_some());
    }

    #[test]
    fn cache_key_is_namespaced_by_prefix() {
        let (_cache, _store, resolver) = setup();
        assert_eq!(resolver.cache_key("issuer-a"), "test:jwt_secrets:issuer-a");
    }
}
