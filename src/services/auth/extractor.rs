//! Bearer token extraction (query parameters → cookies → `Authorization` header).
use std::sync::LazyLock;

use axum::http::{HeaderMap, header};
use regex::Regex;

use crate::services::auth::{config::JwtAuthConfig, outcome::AuthError};

/// `Authorization: Bearer <token>`, scheme case-insensitive.
static BEARER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*bearer\s+(.+)$"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedToken {
    /// Nothing that looks like a token. Not an error at this layer.
    None,
    Single(String),
    /// The same source carried more than one value.
    Multiple(Vec<String>),
}

/// Find the request's token.
///
/// - The first configured query parameter with a non-empty value wins; a parameter
///   repeated in the query string yields `Multiple`.
/// - Cookies are checked next, then the `Authorization` header.
/// - Once a source matched, later sources are not consulted.
pub fn extract_token(
    config: &JwtAuthConfig,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Result<ExtractedToken, AuthError> {
    if let Some(found) = from_query(&config.uri_param_names, query) {
        return Ok(found);
    }

    if let Some(found) = from_cookies(&config.cookie_names, headers) {
        return Ok(found);
    }

    from_authorization(headers)
}

fn from_query(names: &[String], query: Option<&str>) -> Option<ExtractedToken> {
    let query = query?;
    if names.is_empty() {
        return None;
    }

    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    for name in names {
        let mut values: Vec<String> = pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .collect();

        match values.len() {
            0 => continue,
            1 => {
                let value = values.remove(0);
                // `?jwt=` is blank: keep looking
                if !value.is_empty() {
                    return Some(ExtractedToken::Single(value));
                }
            }
            _ => return Some(ExtractedToken::Multiple(values)),
        }
    }

    None
}

fn from_cookies(names: &[String], headers: &HeaderMap) -> Option<ExtractedToken> {
    if names.is_empty() {
        return None;
    }

    let cookies: Vec<(&str, &str)> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .collect();

    names.iter().find_map(|name| {
        cookies
            .iter()
            .find(|(k, v)| *k == name.as_str() && !v.is_empty())
            .map(|(_, v)| ExtractedToken::Single((*v).to_string()))
    })
}

fn from_authorization(headers: &HeaderMap) -> Result<ExtractedToken, AuthError> {
    let values: Vec<&str> = headers
        .get_all(header::AUTHORIZATION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    match values.as_slice() {
        [] => Ok(ExtractedToken::None),
        [value] => {
            let matcher = BEARER
                .as_ref()
                .map_err(|e| AuthError::Matcher(e.to_string()))?;

            Ok(matcher
                .captures(value)
                .and_then(|c| c.get(1))
                .map(|m| ExtractedToken::Single(m.as_str().to_string()))
                .unwrap_or(ExtractedToken::None))
        }
        many => Ok(ExtractedToken::Multiple(
            many.iter().map(|v| (*v).to_string()).collect(),
        )),
    }
}
