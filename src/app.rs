/*
 * Responsibility
 * - Config読み込み → 依存生成 (PgPool, cache, authenticator, rate limiter)
 * - Router 組み立て + middleware の適用順序
 * - axum::serve() で起動
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware;
use crate::repos::{AuthStore, PgAuthStore};
use crate::services::auth::build_authenticator;
use crate::services::cache::{CacheClient, MemoryCache, ValkeyClient};
use crate::services::rate_limit::RateLimiter;
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,jwt_gateway=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // development: fail fast. production: default hook, keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting gateway in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_state(config: &Config) -> Result<AppState> {
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to postgres")?;
    let store: Arc<dyn AuthStore> = Arc::new(PgAuthStore::new(db));

    let cache: Arc<dyn CacheClient> = match &config.valkey_url {
        Some(url) => Arc::new(ValkeyClient::new(url).await?),
        None => {
            tracing::warn!("VALKEY_URL not set, using in-process cache");
            Arc::new(MemoryCache::new())
        }
    };

    Ok(build_state_with(config, cache, store))
}

/// Wire the services from already-built backends.
pub fn build_state_with(
    config: &Config,
    cache: Arc<dyn CacheClient>,
    store: Arc<dyn AuthStore>,
) -> AppState {
    let rate_limiter = config.rate_limit_enabled.then(|| {
        Arc::new(RateLimiter::new(
            cache.clone(),
            config.cache_key_prefix.clone(),
            config.rate_limit_fault_tolerant,
        ))
    });

    let authenticator = build_authenticator(config, cache, store);

    AppState::new(authenticator, rate_limiter)
}

/// `/health` is public; everything under `/api/v1` goes through jwt → quota → handler.
pub fn build_router(state: AppState, config: &Config) -> Router {
    let mut v1 = api::v1::routes();

    // axum: 後から掛けた layer が外側 (先に実行) になる
    if let Some(limiter) = state.rate_limiter.clone() {
        v1 = middleware::rate_limit::apply(v1, limiter);
    }
    let v1 = middleware::auth::jwt::apply(v1, state.authenticator.clone());

    let router = Router::new()
        .route("/health", get(api::v1::handlers::health::health))
        .nest("/api/v1", v1);

    let router = middleware::security_headers::apply(router);
    middleware::http::apply(router, middleware::http::HttpLimits::from_config(config))
}
