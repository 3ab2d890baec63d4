/*
 * Responsibility
 * - GET /api/v1/whoami (保護された demo upstream)
 * - middleware が決めた consumer と、upstream に届いた identity header をそのまま返す
 */
use axum::{Json, http::HeaderMap};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::api::v1::extractors::ConsumerCtx;
use crate::services::auth::context::{
    ANONYMOUS_CONSUMER, CONSUMER_CUSTOM_ID, CONSUMER_ID, CONSUMER_USERNAME, CREDENTIAL_IDENTIFIER,
    JWT_ACCOUNT_ID, JWT_RATE_LIMIT_MINUTE, JWT_RATE_LIMIT_MONTH, JWT_USER_ID,
};
use crate::services::auth::types::Consumer;

#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub consumer: Option<Consumer>,
    pub credential: Option<String>,
    pub anonymous: bool,
    /// Identity headers as received, lower-case name -> value.
    pub headers: BTreeMap<String, String>,
}

pub async fn whoami(ConsumerCtx(ctx): ConsumerCtx, headers: HeaderMap) -> Json<WhoamiResponse> {
    let names = [
        CONSUMER_ID,
        CONSUMER_CUSTOM_ID,
        CONSUMER_USERNAME,
        CREDENTIAL_IDENTIFIER,
        ANONYMOUS_CONSUMER,
        JWT_USER_ID,
        JWT_ACCOUNT_ID,
        JWT_RATE_LIMIT_MONTH,
        JWT_RATE_LIMIT_MINUTE,
    ];

    let received = names
        .iter()
        .filter_map(|name| {
            let value = headers.get(name)?.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .collect();

    Json(WhoamiResponse {
        anonymous: ctx.is_anonymous(),
        credential: ctx.credential.map(|c| c.key),
        consumer: ctx.consumer,
        headers: received,
    })
}
