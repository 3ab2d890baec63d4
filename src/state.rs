/*
 * Responsibility
 * - プロセス全体で共有するコンテキスト (AppState)
 *   - authenticator: JWT layer, rate_limiter: quota layer (無効なら None)
 * - Clone 前提で持つ (内部は Arc)
 */
use std::sync::Arc;

use crate::services::{auth::JwtAuthenticator, rate_limit::RateLimiter};

#[derive(Clone, Debug)]
pub struct AppState {
    pub authenticator: Arc<JwtAuthenticator>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl AppState {
    pub fn new(authenticator: Arc<JwtAuthenticator>, rate_limiter: Option<Arc<RateLimiter>>) -> Self {
        Self {
            authenticator,
            rate_limiter,
        }
    }
}
