/*
 * Responsibility
 * - jwt_secrets テーブル向け SQLx 操作 (read only)
 * - algorithm 列 (TEXT) を JwtAlgorithm に昇格させる
 */
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::repos::error::RepoError;
use crate::services::auth::types::{JwtAlgorithm, JwtCredential};

#[derive(Debug, FromRow)]
pub struct JwtSecretRow {
    pub id: Uuid,
    pub consumer_id: Uuid,
    pub key: String,
    pub algorithm: Option<String>,
    pub secret: Option<String>,
    pub rsa_public_key: Option<String>,
}

impl TryFrom<JwtSecretRow> for JwtCredential {
    type Error = RepoError;

    fn try_from(row: JwtSecretRow) -> Result<Self, Self::Error> {
        // NULL algorithm means the column default (HS256)
        let algorithm = match row.algorithm.as_deref() {
            None | Some("") => JwtAlgorithm::default(),
            Some(raw) => raw.parse().map_err(|e| RepoError::CorruptRow {
                table: "jwt_secrets",
                reason: format!("{e}"),
            })?,
        };

        Ok(JwtCredential {
            id: row.id,
            consumer_id: row.consumer_id,
            key: row.key,
            algorithm,
            secret: row.secret,
            public_key: row.rsa_public_key,
        })
    }
}

pub async fn find_by_key(db: &PgPool, key: &str) -> Result<Option<JwtSecretRow>, RepoError> {
    let row = sqlx::query_as::<_, JwtSecretRow>(
        r#"
        SELECT id, consumer_id, key, algorithm, secret, rsa_public_key
        FROM jwt_secrets
        WHERE key = $1
        "#,
    )
    .bind(key)
    .fetch_optional(db)
    .await?;

    Ok(row)
}
