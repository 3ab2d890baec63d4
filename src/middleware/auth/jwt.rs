//! JWT 検証 → consumer を RequestContext に入れ、identity header を upstream 向けに書き換える
//!
//! - 同じ Router に複数回 `apply` できる (後から掛けた layer が先に走る)
//! - anonymous を設定した layer 同士なら「どれか一つが通れば OK」の OR 合成になる
//! - Rejection は 401/403、AuthError は 500 (anonymous でも隠さない)

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::auth::{AuthOutcome, AuthRequest, JwtAuthenticator, RequestContext};

/// Router 配下の全 route に JWT 認証を掛ける。
///
/// 例：
/// ```ignore
/// let v1 = api::v1::routes();
/// let v1 = middleware::auth::jwt::apply(v1, authenticator.clone());
/// app = app.nest("/api/v1", v1);
/// ```
pub fn apply(router: Router, authenticator: Arc<JwtAuthenticator>) -> Router {
    router.layer(middleware::from_fn_with_state(authenticator, jwt_middleware))
}

async fn jwt_middleware(
    State(authenticator): State<Arc<JwtAuthenticator>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // Body は Sync ではないので、await を跨いで借用するのは parts だけにする
    let (mut parts, body) = req.into_parts();

    let mut ctx = parts
        .extensions
        .remove::<RequestContext>()
        .unwrap_or_default();

    let auth_req = AuthRequest {
        method: &parts.method,
        query: parts.uri.query(),
        headers: &parts.headers,
    };

    match authenticator.authenticate(auth_req, &mut ctx).await? {
        AuthOutcome::Authenticated { .. } => {
            ctx.upstream_headers.apply_to(&mut parts.headers);
        }
        AuthOutcome::Skipped => {}
        AuthOutcome::Rejected(rejection) => return Err(AppError::Rejected(rejection)),
    }

    // middleware → 次の layer / extractor への受け渡し
    parts.extensions.insert(ctx);

    Ok(next.run(Request::from_parts(parts, body)).await)
}
