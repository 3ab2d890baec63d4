//! In-memory `AuthStore` for tests and local experiments.
//!
//! Counts lookups so callers can observe whether a read went through the cache,
//! and can be switched into a failing mode to simulate an unreachable database.
use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::repos::{error::RepoError, store::AuthStore};
use crate::services::auth::types::{Consumer, JwtCredential};

#[derive(Debug, Default)]
pub struct MemoryAuthStore {
    credentials: RwLock<HashMap<String, JwtCredential>>,
    consumers: RwLock<HashMap<Uuid, Consumer>>,
    lookups: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_credential(&self, credential: JwtCredential) {
        if let Ok(mut map) = self.credentials.write() {
            map.insert(credential.key.clone(), credential);
        }
    }

    pub fn insert_consumer(&self, consumer: Consumer) {
        if let Ok(mut map) = self.consumers.write() {
            map.insert(consumer.id, consumer);
        }
    }

    /// Total number of store lookups served (or refused) so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// When set, every lookup fails as if the database were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn begin_lookup(&self) -> Result<(), RepoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Db(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

fn poisoned(table: &'static str) -> RepoError {
    RepoError::CorruptRow {
        table,
        reason: "lock poisoned".to_string(),
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn find_credential_by_key(&self, key: &str) -> Result<Option<JwtCredential>, RepoError> {
        self.begin_lookup()?;
        let map = self
            .credentials
            .read()
            .map_err(|_| poisoned("jwt_secrets"))?;
        Ok(map.get(key).cloned())
    }

    async fn find_consumer_by_id(&self, id: Uuid) -> Result<Option<Consumer>, RepoError> {
        self.begin_lookup()?;
        let map = self.consumers.read().map_err(|_| poisoned("consumers"))?;
        Ok(map.get(&id).cloned())
    }

    async fn find_consumer_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Consumer>, RepoError> {
        self.begin_lookup()?;
        let map = self.consumers.read().map_err(|_| poisoned("consumers"))?;
        Ok(map
            .values()
            .find(|c| c.username.as_deref() == Some(username))
            .cloned())
    }
}
