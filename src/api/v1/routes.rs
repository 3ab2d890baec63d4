/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - JWT / quota の middleware は app.rs 側で nest 前に掛ける
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::whoami::whoami;

pub fn routes() -> Router {
    Router::new().route("/whoami", get(whoami))
}
