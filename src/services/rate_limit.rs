//! Per-consumer quotas backed by the shared cache.
//!
//! Fixed windows per period (calendar minute, calendar month). A request is
//! counted only when it fits every window; a rejected request does not consume
//! quota.
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::debug;

use crate::services::auth::context::{JWT_RATE_LIMIT_MINUTE, JWT_RATE_LIMIT_MONTH};
use crate::services::cache::{CacheClient, CacheError, CacheResult, ttl_seconds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Minute,
    Month,
}

impl Period {
    pub const ALL: [Period; 2] = [Period::Minute, Period::Month];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Minute => "minute",
            Period::Month => "month",
        }
    }

    /// Window label, e.g. `2024-01-31T23:59` or `2024-01`.
    pub fn window(&self, now: DateTime<Utc>) -> String {
        match self {
            Period::Minute => now.format("%Y-%m-%dT%H:%M").to_string(),
            Period::Month => now.format("%Y-%m").to_string(),
        }
    }

    /// Seconds until the current window closes (at least 1).
    pub fn seconds_left(&self, now: DateTime<Utc>) -> u64 {
        let ts = now.timestamp();
        let end = match self {
            Period::Minute => ts - ts.rem_euclid(60) + 60,
            Period::Month => next_month_start(now),
        };
        (end - ts).max(1) as u64
    }

    fn limit_header(&self) -> HeaderName {
        match self {
            Period::Minute => HeaderName::from_static("x-ratelimit-limit-minute"),
            Period::Month => HeaderName::from_static("x-ratelimit-limit-month"),
        }
    }

    fn remaining_header(&self) -> HeaderName {
        match self {
            Period::Minute => HeaderName::from_static("x-ratelimit-remaining-minute"),
            Period::Month => HeaderName::from_static("x-ratelimit-remaining-month"),
        }
    }
}

fn next_month_start(now: DateTime<Utc>) -> i64 {
    let (year, month) = match now.month() {
        12 => (now.year() + 1, 1),
        m => (now.year(), m + 1),
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        // unreachable for any representable date; keep a sane 31-day window
        .unwrap_or(now.timestamp() + 31 * 24 * 3600)
}

/// Limits for one request, taken from the `X-Jwt-Rate-Limit-*` headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaLimits {
    pub minute: Option<u64>,
    pub month: Option<u64>,
}

impl QuotaLimits {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };

        Self {
            minute: read(&JWT_RATE_LIMIT_MINUTE),
            month: read(&JWT_RATE_LIMIT_MONTH),
        }
    }

    pub fn get(&self, period: Period) -> Option<u64> {
        match period {
            Period::Minute => self.minute,
            Period::Month => self.month,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.minute.is_none() && self.month.is_none()
    }

    fn iter(&self) -> impl Iterator<Item = (Period, u64)> + '_ {
        Period::ALL
            .into_iter()
            .filter_map(|p| self.get(p).map(|limit| (p, limit)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodUsage {
    pub period: Period,
    pub limit: u64,
    pub remaining: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed(Vec<PeriodUsage>),
    Exceeded {
        usage: Vec<PeriodUsage>,
        retry_after: u64,
    },
}

impl RateLimitDecision {
    pub fn usage(&self) -> &[PeriodUsage] {
        match self {
            RateLimitDecision::Allowed(usage) => usage,
            RateLimitDecision::Exceeded { usage, .. } => usage,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed(_))
    }

    /// `X-RateLimit-Limit-<Period>` / `X-RateLimit-Remaining-<Period>` pairs.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        for usage in self.usage() {
            headers.insert(usage.period.limit_header(), HeaderValue::from(usage.limit));
            headers.insert(
                usage.period.remaining_header(),
                HeaderValue::from(usage.remaining),
            );
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn CacheClient>,
    prefix: String,
    fault_tolerant: bool,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.cache.backend_name())
            .field("prefix", &self.prefix)
            .field("fault_tolerant", &self.fault_tolerant)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn CacheClient>, prefix: impl Into<String>, fault_tolerant: bool) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            fault_tolerant,
        }
    }

    pub fn fault_tolerant(&self) -> bool {
        self.fault_tolerant
    }

    pub fn counter_key(&self, identifier: &str, period: Period, now: DateTime<Utc>) -> String {
        format!(
            "{}:ratelimit:{}:{}:{}",
            self.prefix,
            identifier,
            period.as_str(),
            period.window(now)
        )
    }

    /// Check every configured period, then count the request if it fits all of them.
    pub async fn check(
        &self,
        identifier: &str,
        limits: &QuotaLimits,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, CacheError> {
        let mut usage = Vec::new();
        let mut retry_after = 0;

        for (period, limit) in limits.iter() {
            let used = self.current(&self.counter_key(identifier, period, now)).await?;
            if used >= limit {
                retry_after = retry_after.max(period.seconds_left(now));
            }
            usage.push(PeriodUsage {
                period,
                limit,
                remaining: limit.saturating_sub(used),
            });
        }

        if retry_after > 0 {
            debug!(identifier, retry_after, "quota exceeded");
            return Ok(RateLimitDecision::Exceeded { usage, retry_after });
        }

        for entry in usage.iter_mut() {
            let key = self.counter_key(identifier, entry.period, now);
            let ttl = ttl_seconds(entry.period.seconds_left(now));
            let used = self.cache.incr_with_ttl(&key, 1, ttl).await?;
            entry.remaining = entry.limit.saturating_sub(used);
        }

        Ok(RateLimitDecision::Allowed(usage))
    }

    async fn current(&self, key: &str) -> CacheResult<u64> {
        match self.cache.get_string(key).await? {
            None => Ok(0),
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| CacheError::InvalidValue(format!("counter {key} is not a number"))),
        }
    }
}
