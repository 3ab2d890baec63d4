//! Downstream headers derived from optional token claims.
use serde_json::Value;

use crate::services::auth::{
    context::{
        JWT_ACCOUNT_ID, JWT_RATE_LIMIT_MINUTE, JWT_RATE_LIMIT_MONTH, JWT_USER_ID, UpstreamHeaders,
    },
    token::Claims,
};

const USER_ID_CLAIM: &str = "user_id";
const ACCOUNT_ID_CLAIM: &str = "account_id";
const RATE_LIMIT_CLAIM: &str = "rate_limit";

/// Identity-provider prefix removed from `user_id` (`auth0|abc123` → `abc123`).
const PROVIDER_PREFIX: &str = "auth0|";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedHeaders {
    pub user_id: Option<String>,
    pub account_id: Option<String>,
    pub rate_limit_month: Option<u64>,
    pub rate_limit_minute: Option<u64>,
}

impl DerivedHeaders {
    /// Each field is independent; a missing or empty claim just leaves it `None`.
    pub fn from_claims(claims: &Claims) -> Self {
        let user_id = claims
            .non_blank_str(USER_ID_CLAIM)
            .map(|v| v.strip_prefix(PROVIDER_PREFIX).unwrap_or(v))
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let account_id = claims.non_blank_str(ACCOUNT_ID_CLAIM).map(str::to_string);

        let rate_limit = claims.get(RATE_LIMIT_CLAIM).and_then(Value::as_object);
        let limit = |period: &str| rate_limit.and_then(|r| r.get(period)).and_then(as_limit);

        Self {
            user_id,
            account_id,
            rate_limit_month: limit("month"),
            rate_limit_minute: limit("minute"),
        }
    }

    /// Set present fields, clear absent ones.
    pub fn write_to(&self, headers: &mut UpstreamHeaders) {
        headers.set_or_clear(JWT_USER_ID, self.user_id.as_deref());
        headers.set_or_clear(JWT_ACCOUNT_ID, self.account_id.as_deref());
        headers.set_or_clear(
            JWT_RATE_LIMIT_MONTH,
            self.rate_limit_month.map(|n| n.to_string()).as_deref(),
        );
        headers.set_or_clear(
            JWT_RATE_LIMIT_MINUTE,
            self.rate_limit_minute.map(|n| n.to_string()).as_deref(),
        );
    }
}

/// Non-negative integral number (`100` or `100.0`).
fn as_limit(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}
