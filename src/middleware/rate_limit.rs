//! Per-consumer quotas on top of the JWT layer.
//!
//! Must run after `auth::jwt`: the identifier is the resolved consumer id and
//! the limits are the `X-Jwt-Rate-Limit-*` headers that layer wrote. Requests
//! without a consumer or without limits pass untouched.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{error, warn};

use crate::error::AppError;
use crate::services::auth::RequestContext;
use crate::services::rate_limit::{QuotaLimits, RateLimitDecision, RateLimiter};

pub fn apply(router: Router, limiter: Arc<RateLimiter>) -> Router {
    router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
}

async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let identifier = req
        .extensions()
        .get::<RequestContext>()
        .and_then(|ctx| ctx.consumer.as_ref())
        .map(|consumer| consumer.id.to_string());
    let limits = QuotaLimits::from_headers(req.headers());

    let Some(identifier) = identifier.filter(|_| !limits.is_empty()) else {
        return Ok(next.run(req).await);
    };

    let decision = match limiter.check(&identifier, &limits, Utc::now()).await {
        Ok(decision) => decision,
        Err(err) if limiter.fault_tolerant() => {
            warn!(error = %err, %identifier, "quota check failed, letting the request through");
            return Ok(next.run(req).await);
        }
        Err(err) => {
            error!(error = %err, %identifier, "quota check failed");
            return Err(AppError::Internal);
        }
    };

    let mut response = match &decision {
        RateLimitDecision::Exceeded { retry_after, .. } => AppError::TooManyRequests {
            retry_after: *retry_after,
        }
        .into_response(),
        RateLimitDecision::Allowed(_) => next.run(req).await,
    };

    decision.write_headers(response.headers_mut());
    Ok(response)
}
