/*
 * Responsibility
 * - consumers テーブル向け SQLx 操作 (read only)
 * - 認証パイプラインが必要とする lookup だけを提供する
 */
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::repos::error::RepoError;
use crate::services::auth::types::Consumer;

#[derive(Debug, FromRow)]
pub struct ConsumerRow {
    pub id: Uuid,
    pub custom_id: Option<String>,
    pub username: Option<String>,
}

impl From<ConsumerRow> for Consumer {
    fn from(row: ConsumerRow) -> Self {
        Consumer {
            id: row.id,
            custom_id: row.custom_id,
            username: row.username,
        }
    }
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<ConsumerRow>, RepoError> {
    let row = sqlx::query_as::<_, ConsumerRow>(
        r#"
        SELECT id, custom_id, username
        FROM consumers
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    Ok(row)
}

pub async fn find_by_username(
    db: &PgPool,
    username: &str,
) -> Result<Option<ConsumerRow>, RepoError> {
    let row = sqlx::query_as::<_, ConsumerRow>(
        r#"
        SELECT id, custom_id, username
        FROM consumers
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(db)
    .await?;

    Ok(row)
}
