/**
 * Responsibility
 * - repo が上位に伝えるエラーの意味
 * - "見つからない" は Option で返すのでここには含めない
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("db error")]
    Db(#[from] sqlx::Error),
    #[error("corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}
