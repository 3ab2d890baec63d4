/*
 * Responsibility
 * - 環境変数や設定の読み込み (DATABASE_URL, VALKEY_URL, JWT レイヤ設定など)
 * - 設定値のバリデーション (不足・不正なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::services::auth::{JwtAuthConfig, RegisteredClaim};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()))
    }

    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub database_url: String,

    // Valkey is optional: without it the process keeps an in-memory cache.
    pub valkey_url: Option<String>,
    pub cache_key_prefix: String,
    pub cache_ttl_seconds: u64,

    pub jwt: JwtAuthConfig,

    pub rate_limit_enabled: bool,
    pub rate_limit_fault_tolerant: bool,

    pub request_timeout_seconds: u64,
    pub request_body_limit_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production, a map in tests).
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 3000,
        };

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = get("APP_ENV")
            .map(|v| AppEnv::parse(&v))
            .unwrap_or(AppEnv::Development);

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let valkey_url = get("VALKEY_URL").filter(|s| !s.trim().is_empty());

        let cache_key_prefix = get("CACHE_KEY_PREFIX")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "jwt-gateway".to_string());

        let cache_ttl_seconds = parse_or(&get, "CACHE_TTL_SECONDS", 300)?;

        let uri_param_names = get("JWT_URI_PARAM_NAMES")
            .map(|v| split_list(&v))
            .unwrap_or_else(|| vec!["jwt".to_string()]);

        let cookie_names = get("JWT_COOKIE_NAMES")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        let key_claim_name = get("JWT_KEY_CLAIM_NAME")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "iss".to_string());

        let claims_to_verify = split_list(&get("JWT_CLAIMS_TO_VERIFY").unwrap_or_else(|| "exp".into()))
            .iter()
            .map(|c| c.parse::<RegisteredClaim>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConfigError::Invalid("JWT_CLAIMS_TO_VERIFY"))?;

        let secret_is_base64 = parse_bool(&get, "JWT_SECRET_IS_BASE64", false)?;
        let anonymous = get("JWT_ANONYMOUS").unwrap_or_default().trim().to_string();
        let run_on_preflight = parse_bool(&get, "JWT_RUN_ON_PREFLIGHT", true)?;
        let maximum_expiration = parse_or(&get, "JWT_MAXIMUM_EXPIRATION", 0)?;

        // `maximum_expiration` is only meaningful when `exp` itself is verified
        if maximum_expiration > 0 && !claims_to_verify.contains(&RegisteredClaim::Exp) {
            return Err(ConfigError::Invalid("JWT_MAXIMUM_EXPIRATION"));
        }

        let rate_limit_enabled = parse_bool(&get, "RATE_LIMIT_ENABLED", true)?;
        let rate_limit_fault_tolerant = parse_bool(&get, "RATE_LIMIT_FAULT_TOLERANT", true)?;

        let request_timeout_seconds = parse_or(&get, "REQUEST_TIMEOUT_SECONDS", 30)?;
        let request_body_limit_bytes = parse_or(&get, "REQUEST_BODY_LIMIT_BYTES", 1024 * 1024)?;

        Ok(Self {
            addr,
            app_env,
            database_url,
            valkey_url,
            cache_key_prefix,
            cache_ttl_seconds,
            jwt: JwtAuthConfig {
                uri_param_names,
                cookie_names,
                key_claim_name,
                claims_to_verify,
                secret_is_base64,
                anonymous,
                run_on_preflight,
                maximum_expiration,
            },
            rate_limit_enabled,
            rate_limit_fault_tolerant,
            request_timeout_seconds,
            request_body_limit_bytes,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<F, T>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn parse_bool<F>(get: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid(key)),
        },
    }
}
