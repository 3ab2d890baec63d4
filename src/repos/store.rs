/*
 * Responsibility
 * - 認証パイプラインから見た persistent store の境界 (AuthStore)
 * - Postgres 実装 (PgAuthStore) は repo 関数に委譲する
 */
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repos::{consumer_repo, error::RepoError, jwt_secret_repo};
use crate::services::auth::types::{Consumer, JwtCredential};

/// Read-only lookups the authentication pipeline needs.
///
/// `Ok(None)` means "no such record"; `Err(_)` means the store could not answer.
#[async_trait]
pub trait AuthStore: Send + Sync + 'static {
    async fn find_credential_by_key(&self, key: &str) -> Result<Option<JwtCredential>, RepoError>;

    async fn find_consumer_by_id(&self, id: Uuid) -> Result<Option<Consumer>, RepoError>;

    async fn find_consumer_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Consumer>, RepoError>;
}

#[derive(Clone, Debug)]
pub struct PgAuthStore {
    db: PgPool,
}

impl PgAuthStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn find_credential_by_key(&self, key: &str) -> Result<Option<JwtCredential>, RepoError> {
        jwt_secret_repo::find_by_key(&self.db, key)
            .await?
            .map(JwtCredential::try_from)
            .transpose()
    }

    async fn find_consumer_by_id(&self, id: Uuid) -> Result<Option<Consumer>, RepoError> {
        Ok(consumer_repo::find_by_id(&self.db, id)
            .await?
            .map(Consumer::from))
    }

    async fn find_consumer_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Consumer>, RepoError> {
        Ok(consumer_repo::find_by_username(&self.db, username)
            .await?
            .map(Consumer::from))
    }
}
