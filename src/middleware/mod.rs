/*
 * Responsibility
 * - middleware の公開インターフェース
 * - auth::jwt (consumer 解決), rate_limit (quota), http / security_headers (横断的関心事)
 */
pub mod auth;
pub mod http;
pub mod rate_limit;
pub mod security_headers;
