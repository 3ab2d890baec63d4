use std::{sync::Arc, time::Duration};

use uuid::Uuid;

use crate::repos::AuthStore;
use crate::services::auth::{outcome::AuthError, types::Consumer};
use crate::services::cache::{CacheClient, CacheLoader};

/// Maps a consumer reference (id, or username for configured references) to its record.
#[derive(Clone)]
pub struct ConsumerResolver {
    by_id: CacheLoader<Uuid, Consumer>,
    by_username: CacheLoader<str, Consumer>,
    store: Arc<dyn AuthStore>,
}

impl std::fmt::Debug for ConsumerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerResolver")
            .field("by_id", &self.by_id)
            .field("by_username", &self.by_username)
            .finish()
    }
}

impl ConsumerResolver {
    pub fn new(
        cache: Arc<dyn CacheClient>,
        store: Arc<dyn AuthStore>,
        prefix: &str,
        ttl: Duration,
    ) -> Self {
        Self {
            by_id: CacheLoader::new(cache.clone(), format!("{prefix}:consumers"), ttl),
            by_username: CacheLoader::new(cache, format!("{prefix}:consumers_by_username"), ttl),
            store,
        }
    }

    pub async fn resolve_id(&self, id: Uuid) -> Result<Option<Consumer>, AuthError> {
        self.by_id
            .get_or_load(&id, || async {
                self.store
                    .find_consumer_by_id(id)
                    .await
                    .map_err(AuthError::from)
            })
            .await
    }

    /// Resolve `reference` (a UUID, otherwise a username). Absence is `Ok(None)`.
    pub async fn resolve(&self, reference: &str) -> Result<Option<Consumer>, AuthError> {
        match Uuid::parse_str(reference) {
            Ok(id) => self.resolve_id(id).await,
            Err(_) => {
                self.by_username
                    .get_or_load(reference, || async {
                        self.store
                            .find_consumer_by_username(reference)
                            .await
                            .map_err(AuthError::from)
                    })
                    .await
            }
        }
    }

    /// The configured anonymous consumer must exist; absence is fatal.
    pub async fn resolve_anonymous(&self, reference: &str) -> Result<Consumer, AuthError> {
        self.resolve(reference)
            .await?
            .ok_or_else(|| AuthError::AnonymousNotFound(reference.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::MemoryAuthStore;
    use crate::services::cache::MemoryCache;

    fn setup() -> (Arc<MemoryAuthStore>, ConsumerResolver) {
        let store = Arc::new(MemoryAuthStore::new());
        let resolver = ConsumerResolver::new(
            Arc::new(MemoryCache::new()),
            store.clone(),
            "test",
            Duration::from_secs(60),
        );
        (store, resolver)
    }

    fn consumer(username: &str) -> Consumer {
        Consumer {
            id: Uuid::new_v4(),
            custom_id: Some(format!("custom-{username}")),
            username: Some(username.to_string()),
        }
    }

    #[tokio::test]
    async fn resolves_by_id_and_caches() {
        let (store, resolver) = setup();
        let alice = consumer("alice");
        store.insert_consumer(alice.clone());

        let id = alice.id.to_string();
        assert_eq!(resolver.resolve(&id).await.unwrap(), Some(alice.clone()));
        assert_eq!(resolver.resolve(&id).await.unwrap(), Some(alice));
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn non_uuid_reference_is_a_username() {
        let (store, resolver) = setup();
        let anon = consumer("anonymous");
        store.insert_consumer(anon.clone());

        assert_eq!(resolver.resolve_anonymous("anonymous").await.unwrap(), anon);
    }

    #[tokio::test]
    async fn missing_consumer_is_absent_unless_anonymous() {
        let (_store, resolver) = setup();
        let id = Uuid::new_v4().to_string();

        assert_eq!(resolver.resolve(&id).await.unwrap(), None);

        let err = resolver.resolve_anonymous(&id).await.unwrap_err();
        assert!(matches!(err, AuthError::AnonymousNotFound(r) if r == id));
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let (store, resolver) = setup();
        store.set_failing(true);

        let err = resolver.resolve_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AuthError::Store(_)));

        let err = resolver.resolve_anonymous("anonymous").await.unwrap_err();
        assert!(matches!(err, AuthError::Store(_)));
    }
}
