/*
 * Responsibility
 * - 認証レイヤ間で受け渡す per-request コンテキスト (RequestContext)
 * - middleware が request extensions に入れ、次の認証レイヤ / handler が読む
 * - upstream に付ける/消すヘッダーの一覧 (UpstreamHeaders)
 */
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::services::auth::types::{Consumer, JwtCredential};

pub const CONSUMER_ID: HeaderName = HeaderName::from_static("x-consumer-id");
pub const CONSUMER_CUSTOM_ID: HeaderName = HeaderName::from_static("x-consumer-custom-id");
pub const CONSUMER_USERNAME: HeaderName = HeaderName::from_static("x-consumer-username");
pub const CREDENTIAL_IDENTIFIER: HeaderName = HeaderName::from_static("x-credential-identifier");
pub const ANONYMOUS_CONSUMER: HeaderName = HeaderName::from_static("x-anonymous-consumer");
pub const JWT_USER_ID: HeaderName = HeaderName::from_static("x-jwt-user-id");
pub const JWT_ACCOUNT_ID: HeaderName = HeaderName::from_static("x-jwt-account-id");
pub const JWT_RATE_LIMIT_MONTH: HeaderName = HeaderName::from_static("x-jwt-rate-limit-month");
pub const JWT_RATE_LIMIT_MINUTE: HeaderName = HeaderName::from_static("x-jwt-rate-limit-minute");

/// Header edits to apply to the downstream request, in order.
///
/// `None` removes the header (so clients cannot inject identity headers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamHeaders {
    edits: Vec<(HeaderName, Option<HeaderValue>)>,
}

impl UpstreamHeaders {
    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        self.edits.push((name, Some(value)));
    }

    /// Set when `value` is present and representable as a header value; clear otherwise.
    pub fn set_or_clear(&mut self, name: HeaderName, value: Option<&str>) {
        match value.and_then(|v| HeaderValue::from_str(v).ok()) {
            Some(v) => self.set(name, v),
            None => self.clear(name),
        }
    }

    pub fn clear(&mut self, name: HeaderName) {
        self.edits.push((name, None));
    }

    /// The value a header ends up with after all edits (`None` if cleared or untouched).
    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.edits
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn apply_to(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.edits {
            match value {
                Some(v) => {
                    headers.insert(name.clone(), v.clone());
                }
                None => {
                    headers.remove(name);
                }
            }
        }
    }
}

/// Authentication state threaded through every auth layer of one request.
///
/// - `credential` set ⇒ the request is authenticated by a real credential; later
///   layers configured with an anonymous fallback skip themselves.
/// - `consumer` set without `credential` ⇒ anonymous fallback.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub consumer: Option<Consumer>,
    pub credential: Option<JwtCredential>,
    pub upstream_headers: UpstreamHeaders,
}

impl RequestContext {
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    pub fn is_anonymous(&self) -> bool {
        self.consumer.is_some() && self.credential.is_none()
    }
}
