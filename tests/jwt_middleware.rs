#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Router-level tests for the JWT and quota layers.
//!
//! The full router is built the same way `app::run` builds it, with the
//! Postgres store and Valkey replaced by their in-memory counterparts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use jwt_gateway::app::{build_router, build_state_with};
use jwt_gateway::config::Config;
use jwt_gateway::middleware;
use jwt_gateway::repos::{AuthStore, MemoryAuthStore};
use jwt_gateway::services::auth::build_authenticator;
use jwt_gateway::services::auth::types::{Consumer, JwtAlgorithm, JwtCredential};
use jwt_gateway::services::cache::{CacheClient, CacheError, CacheResult, MemoryCache};

const SECRET: &str = "issuer-a-secret";
const OTHER_SECRET: &str = "issuer-b-secret";

struct Harness {
    store: Arc<MemoryAuthStore>,
    cache: Arc<dyn CacheClient>,
    alice: Consumer,
    bob: Consumer,
    anon: Consumer,
}

impl Harness {
    fn new() -> Self {
        Self::with_cache(Arc::new(MemoryCache::new()))
    }

    fn with_cache(cache: Arc<dyn CacheClient>) -> Self {
        let store = Arc::new(MemoryAuthStore::new());

        let alice = consumer("alice");
        let bob = consumer("bob");
        let anon = Consumer {
            id: Uuid::new_v4(),
            custom_id: None,
            username: Some("anonymous".into()),
        };
        store.insert_consumer(alice.clone());
        store.insert_consumer(bob.clone());
        store.insert_consumer(anon.clone());

        store.insert_credential(credential("issuer-a", alice.id, SECRET));
        store.insert_credential(credential("issuer-b", bob.id, OTHER_SECRET));

        Self {
            store,
            cache,
            alice,
            bob,
            anon,
        }
    }

    fn router(&self, vars: &[(&str, &str)]) -> Router {
        let config = config(vars);
        let store: Arc<dyn AuthStore> = self.store.clone();
        let state = build_state_with(&config, self.cache.clone(), store);
        build_router(state, &config)
    }
}

fn consumer(username: &str) -> Consumer {
    Consumer {
        id: Uuid::new_v4(),
        custom_id: Some(format!("{username}-custom")),
        username: Some(username.to_string()),
    }
}

fn credential(key: &str, consumer_id: Uuid, secret: &str) -> JwtCredential {
    JwtCredential {
        id: Uuid::new_v4(),
        consumer_id,
        key: key.to_string(),
        algorithm: JwtAlgorithm::Hs256,
        secret: Some(secret.to_string()),
        public_key: None,
    }
}

fn config(vars: &[(&str, &str)]) -> Config {
    let mut map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.entry("DATABASE_URL".into())
        .or_insert_with(|| "postgres://unused".into());
    Config::from_lookup(|key| map.get(key).cloned()).unwrap()
}

fn sign(claims: Value, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn alice_token() -> String {
    sign(
        json!({"iss": "issuer-a", "exp": Utc::now().timestamp() + 3600, "user_id": "auth0|abc123"}),
        SECRET,
    )
}

fn bob_token() -> String {
    sign(
        json!({"iss": "issuer-b", "exp": Utc::now().timestamp() + 3600}),
        OTHER_SECRET,
    )
}

fn whoami(uri: &str) -> axum::http::request::Builder {
    Request::builder().method(Method::GET).uri(uri)
}

async fn send(router: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = router.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, bytes.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let h = Harness::new();
    let req = Request::get("/health").body(Body::empty()).unwrap();

    let (status, _, body) = send(h.router(&[]), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "ok");
}

#[tokio::test]
async fn missing_token_is_a_bare_401() {
    let h = Harness::new();
    let req = whoami("/api/v1/whoami").body(Body::empty()).unwrap();

    let (status, headers, body) = send(h.router(&[]), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.is_empty());
    assert!(headers.get("x-request-id").is_some());
}

#[tokio::test]
async fn valid_token_reaches_the_upstream_with_identity_headers() {
    let h = Harness::new();
    let req = whoami("/api/v1/whoami")
        .header(header::AUTHORIZATION, format!("Bearer {}", alice_token()))
        // client-supplied identity headers must not survive
        .header("x-anonymous-consumer", "true")
        .header("x-jwt-account-id", "spoofed")
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(h.router(&[]), req).await;
    assert_eq!(status, StatusCode::OK);

    let body = json_body(&body);
    assert_eq!(body["anonymous"], false);
    assert_eq!(body["credential"], "issuer-a");
    assert_eq!(body["consumer"]["username"], "alice");

    let headers = &body["headers"];
    assert_eq!(headers["x-consumer-id"], h.alice.id.to_string());
    assert_eq!(headers["x-consumer-custom-id"], "alice-custom");
    assert_eq!(headers["x-consumer-username"], "alice");
    assert_eq!(headers["x-credential-identifier"], "issuer-a");
    assert_eq!(headers["x-jwt-user-id"], "abc123");
    assert!(headers.get("x-anonymous-consumer").is_none());
    assert!(headers.get("x-jwt-account-id").is_none());
}

#[tokio::test]
async fn anonymous_fallback_without_a_token() {
    let h = Harness::new();
    let req = whoami("/api/v1/whoami").body(Body::empty()).unwrap();

    let (status, _, body) = send(h.router(&[("JWT_ANONYMOUS", "anonymous")]), req).await;
    assert_eq!(status, StatusCode::OK);

    let body = json_body(&body);
    assert_eq!(body["anonymous"], true);
    assert_eq!(body["credential"], Value::Null);
    assert_eq!(body["headers"]["x-consumer-id"], h.anon.id.to_string());
    assert_eq!(body["headers"]["x-anonymous-consumer"], "true");
}

#[tokio::test]
async fn bad_signature_with_anonymous_gets_anonymous_identity() {
    let h = Harness::new();
    let forged = sign(
        json!({"iss": "issuer-a", "exp": Utc::now().timestamp() + 3600, "user_id": "auth0|abc123"}),
        "not-the-secret",
    );
    let req = whoami("/api/v1/whoami")
        .header(header::AUTHORIZATION, format!("Bearer {forged}"))
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(h.router(&[("JWT_ANONYMOUS", "anonymous")]), req).await;
    assert_eq!(status, StatusCode::OK);

    let headers = &json_body(&body)["headers"];
    assert_eq!(headers["x-consumer-username"], "anonymous");
    assert_eq!(headers["x-anonymous-consumer"], "true");
    assert!(headers.get("x-jwt-user-id").is_none());
    assert!(headers.get("x-credential-identifier").is_none());
}

#[tokio::test]
async fn bad_signature_without_anonymous_is_forbidden() {
    let h = Harness::new();
    let forged = sign(
        json!({"iss": "issuer-a", "exp": Utc::now().timestamp() + 3600}),
        "not-the-secret",
    );
    let req = whoami("/api/v1/whoami")
        .header(header::AUTHORIZATION, format!("Bearer {forged}"))
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(h.router(&[]), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_body(&body)["error"]["message"], "Invalid signature");
}

const ES256_PRIVATE: &str = include_str!("fixtures/es256_private.pem");
const ES256_PUBLIC: &str = include_str!("fixtures/es256_public.pem");

/// Registers an ES256 credential `issuer-ec` for bob.
fn with_ec_credential(h: &Harness) {
    h.store.insert_credential(JwtCredential {
        id: Uuid::new_v4(),
        consumer_id: h.bob.id,
        key: "issuer-ec".into(),
        algorithm: JwtAlgorithm::Es256,
        secret: None,
        public_key: Some(ES256_PUBLIC.into()),
    });
}

#[tokio::test]
async fn es256_token_is_verified_with_the_public_key() {
    let h = Harness::new();
    with_ec_credential(&h);
    let token = encode(
        &Header::new(Algorithm::ES256),
        &json!({"iss": "issuer-ec", "exp": Utc::now().timestamp() + 3600}),
        &EncodingKey::from_ec_pem(ES256_PRIVATE.as_bytes()).unwrap(),
    )
    .unwrap();
    let req = whoami("/api/v1/whoami")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(h.router(&[]), req).await;
    assert_eq!(status, StatusCode::OK);

    let body = json_body(&body);
    assert_eq!(body["credential"], "issuer-ec");
    assert_eq!(body["headers"]["x-consumer-id"], h.bob.id.to_string());
}

#[tokio::test]
async fn hs256_token_signed_with_an_ec_public_key_is_forbidden() {
    let h = Harness::new();
    with_ec_credential(&h);
    let forged = sign(
        json!({"iss": "issuer-ec", "exp": Utc::now().timestamp() + 3600}),
        ES256_PUBLIC,
    );
    let req = whoami("/api/v1/whoami")
        .header(header::AUTHORIZATION, format!("Bearer {forged}"))
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(h.router(&[]), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_body(&body)["error"]["message"], "Invalid algorithm");
}

#[tokio::test]
async fn query_parameter_wins_over_the_header() {
    let h = Harness::new();
    let uri = format!("/api/v1/whoami?jwt={}", alice_token());
    let req = whoami(&uri)
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(h.router(&[]), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["consumer"]["username"], "alice");
}

#[tokio::test]
async fn empty_query_parameter_counts_as_absent() {
    let h = Harness::new();
    let req = whoami("/api/v1/whoami?jwt=")
        .header(header::AUTHORIZATION, format!("Bearer {}", bob_token()))
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(h.router(&[]), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["headers"]["x-consumer-id"], h.bob.id.to_string());
}

#[tokio::test]
async fn expired_token_lists_the_claim() {
    let h = Harness::new();
    let expired = sign(
        json!({"iss": "issuer-a", "exp": Utc::now().timestamp() - 10}),
        SECRET,
    );
    let req = whoami("/api/v1/whoami")
        .header(header::AUTHORIZATION, format!("Bearer {expired}"))
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(h.router(&[]), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let body = json_body(&body);
    assert_eq!(body["error"]["message"], "Invalid claims");
    assert_eq!(body["error"]["claims"]["exp"], "token expired");
}

#[tokio::test]
async fn store_failures_are_not_masked_by_anonymous() {
    let h = Harness::new();
    h.store.set_failing(true);

    let req = whoami("/api/v1/whoami")
        .header(header::AUTHORIZATION, format!("Bearer {}", alice_token()))
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(h.router(&[("JWT_ANONYMOUS", "anonymous")]), req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&body)["error"]["code"], "INTERNAL_SERVER_ERROR");
}

#[tokio::test]
async fn preflight_can_bypass_authentication() {
    let h = Harness::new();
    let preflight = || {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/whoami")
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, _) = send(h.router(&[]), preflight()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // no OPTIONS handler: reaching the router yields 405 instead of 401
    let router = h.router(&[("JWT_RUN_ON_PREFLIGHT", "false")]);
    let (status, _, _) = send(router, preflight()).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

/// Two JWT layers, each with an anonymous fallback, behave as a logical OR.
fn or_router(h: &Harness) -> Router {
    let store: Arc<dyn AuthStore> = h.store.clone();

    let first = config(&[("JWT_ANONYMOUS", "anonymous"), ("JWT_URI_PARAM_NAMES", "a")]);
    let mut second = first.clone();
    second.jwt.uri_param_names = vec!["b".into()];

    let inner = build_authenticator(&second, h.cache.clone(), store.clone());
    let outer = build_authenticator(&first, h.cache.clone(), store);

    let v1 = jwt_gateway::api::v1::routes();
    let v1 = middleware::auth::jwt::apply(v1, inner);
    let v1 = middleware::auth::jwt::apply(v1, outer);
    Router::new().nest("/api/v1", v1)
}

#[tokio::test]
async fn two_anonymous_layers_compose_as_or() {
    let h = Harness::new();

    // outer layer authenticates, inner one skips itself
    let uri = format!("/api/v1/whoami?a={}", alice_token());
    let (status, _, body) = send(or_router(&h), whoami(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["consumer"]["username"], "alice");
    assert_eq!(body["anonymous"], false);

    // outer layer falls back to anonymous, inner one authenticates
    let uri = format!("/api/v1/whoami?b={}", bob_token());
    let (status, _, body) = send(or_router(&h), whoami(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["consumer"]["username"], "bob");
    assert_eq!(body["anonymous"], false);
    assert!(body["headers"].get("x-anonymous-consumer").is_none());

    // neither matches
    let (status, _, body) = send(
        or_router(&h),
        whoami("/api/v1/whoami").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["anonymous"], true);
}

fn limited_token(minute: u64) -> String {
    sign(
        json!({
            "iss": "issuer-a",
            "exp": Utc::now().timestamp() + 3600,
            "rate_limit": {"minute": minute, "month": 1000}
        }),
        SECRET,
    )
}

#[tokio::test]
async fn quota_from_claims_is_enforced() {
    let h = Harness::new();
    let router = h.router(&[]);
    let token = limited_token(2);
    let request = || {
        whoami("/api/v1/whoami")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, headers, _) = send(router.clone(), request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-ratelimit-limit-minute").unwrap(), "2");
    assert_eq!(headers.get("x-ratelimit-remaining-minute").unwrap(), "1");
    assert_eq!(headers.get("x-ratelimit-remaining-month").unwrap(), "999");

    let (status, _, _) = send(router.clone(), request()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, body) = send(router, request()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.get(header::RETRY_AFTER).is_some());
    assert_eq!(headers.get("x-ratelimit-remaining-minute").unwrap(), "0");
    assert_eq!(json_body(&body)["error"]["message"], "API rate limit exceeded");
}

#[tokio::test]
async fn quota_can_be_disabled() {
    let h = Harness::new();
    let router = h.router(&[("RATE_LIMIT_ENABLED", "false")]);
    let token = limited_token(1);

    for _ in 0..3 {
        let req = whoami("/api/v1/whoami")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(router.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get("x-ratelimit-limit-minute").is_none());
    }
}

/// Memory cache whose quota counters are unreachable.
struct CountersDown(MemoryCache);

#[async_trait]
impl CacheClient for CountersDown {
    fn backend_name(&self) -> &'static str {
        "counters-down"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        if key.contains(":ratelimit:") {
            return Err(CacheError::BackendConnection("down".into()));
        }
        self.0.get_string(key).await
    }

    async fn set_string_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.0.set_string_with_ttl(key, value, ttl).await
    }

    async fn incr_with_ttl(&self, _key: &str, _delta: u64, _ttl: Duration) -> CacheResult<u64> {
        Err(CacheError::BackendConnection("down".into()))
    }
}

#[tokio::test]
async fn quota_backend_failures_follow_fault_tolerance() {
    let h = Harness::with_cache(Arc::new(CountersDown(MemoryCache::new())));
    let token = limited_token(1);
    let request = || {
        whoami("/api/v1/whoami")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, headers, _) = send(h.router(&[]), request()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("x-ratelimit-limit-minute").is_none());

    let strict = h.router(&[("RATE_LIMIT_FAULT_TOLERANT", "false")]);
    let (status, _, _) = send(strict, request()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
