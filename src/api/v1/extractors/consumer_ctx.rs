use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::auth::RequestContext;

/// Handler で、認証済みの RequestContext を受け取るための extractor
/// jwt middleware が RequestContext を request.extensions() に insert 済みである前提
/// consumer が無い場合は 401 を返す (middleware 未設定)
pub struct ConsumerCtx(pub RequestContext);

impl<S> FromRequestParts<S> for ConsumerCtx
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .filter(|ctx| ctx.consumer.is_some())
            .cloned()
            .map(ConsumerCtx)
            .ok_or(AppError::Unauthorized)
    }
}
