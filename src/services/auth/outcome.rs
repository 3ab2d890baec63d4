//! Results of one authentication attempt.
//!
//! - `Rejection`: a deliberate policy decision (401/403). Anonymous fallback may mask it.
//! - `AuthError`: infrastructure failure (500). Never masked.
use std::collections::BTreeMap;

use axum::http::StatusCode;
use thiserror::Error;

use crate::repos::RepoError;
use crate::services::auth::types::{Consumer, JwtCredential};
use crate::services::cache::CacheError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// No token anywhere in the request. Rendered without a message.
    #[error("no token")]
    NoToken,
    #[error("Multiple tokens provided")]
    MultipleTokens,
    #[error("Bad token; {0}")]
    BadToken(String),
    #[error("No mandatory '{0}' in claims")]
    MissingKeyClaim(String),
    #[error("Invalid '{0}' in claims")]
    InvalidKeyClaim(String),
    #[error("No credentials found for given '{0}'")]
    UnknownCredential(String),
    /// The stored key could not be decoded (base64 secret).
    #[error("Invalid key/secret")]
    UndecodableSecret,
    /// The credential has no usable key for its algorithm.
    #[error("Invalid key/secret")]
    InvalidKeyMaterial,
    #[error("Invalid algorithm")]
    InvalidAlgorithm,
    #[error("Invalid signature")]
    InvalidSignature,
    /// Registered claim violations, claim name -> reason.
    #[error("Invalid claims")]
    InvalidClaims(BTreeMap<String, String>),
    #[error("Invalid claims")]
    ExpirationTooFar(BTreeMap<String, String>),
    #[error("Could not find consumer for '{claim}={value}'")]
    UnknownConsumer { claim: String, value: String },
}

impl Rejection {
    /// Unverifiable input → 401, verifiable but denied → 403.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoToken
            | Self::MultipleTokens
            | Self::BadToken(_)
            | Self::MissingKeyClaim(_)
            | Self::InvalidKeyClaim(_)
            | Self::UnknownCredential(_)
            | Self::UndecodableSecret
            | Self::InvalidClaims(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidKeyMaterial
            | Self::InvalidAlgorithm
            | Self::InvalidSignature
            | Self::ExpirationTooFar(_)
            | Self::UnknownConsumer { .. } => StatusCode::FORBIDDEN,
        }
    }

    /// Client-facing message; `None` for the silent no-token case.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::NoToken => None,
            other => Some(other.to_string()),
        }
    }

    /// Per-claim details, when the rejection is about registered claims.
    pub fn claim_errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::InvalidClaims(errors) | Self::ExpirationTooFar(errors) => Some(errors),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("store lookup failed: {0}")]
    Store(#[from] RepoError),
    #[error("authorization header matcher failed: {0}")]
    Matcher(String),
    #[error("anonymous consumer '{0}' is configured but doesn't exist")]
    AnonymousNotFound(String),
}

/// What the pipeline decided for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A consumer is attached. `credential` is `None` on the anonymous path.
    Authenticated {
        consumer: Consumer,
        credential: Option<JwtCredential>,
    },
    Rejected(Rejection),
    /// Nothing to do: a previous layer already authenticated the request
    /// (and this one allows anonymous), or a preflight request is exempt.
    Skipped,
}

/// Internal short-circuit type for the pipeline stages, so `?` can carry
/// either kind of failure.
#[derive(Debug)]
pub(crate) enum Failure {
    Rejected(Rejection),
    Fatal(AuthError),
}

impl From<Rejection> for Failure {
    fn from(r: Rejection) -> Self {
        Self::Rejected(r)
    }
}

impl From<AuthError> for Failure {
    fn from(e: AuthError) -> Self {
        Self::Fatal(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_token_is_a_silent_401() {
        assert_eq!(Rejection::NoToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Rejection::NoToken.message(), None);
    }

    #[test]
    fn statuses_split_unverifiable_from_denied() {
        assert_eq!(
            Rejection::BadToken("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Rejection::UnknownCredential("iss".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(Rejection::InvalidAlgorithm.status(), StatusCode::FORBIDDEN);
        assert_eq!(Rejection::InvalidSignature.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            Rejection::UnknownConsumer {
                claim: "iss".into(),
                value: "a".into()
            }
            .status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn messages_name_the_claim() {
        assert_eq!(
            Rejection::MissingKeyClaim("iss".into()).message().as_deref(),
            Some("No mandatory 'iss' in claims")
        );
        assert_eq!(
            Rejection::UnknownConsumer {
                claim: "iss".into(),
                value: "tenant-a".into()
            }
            .message()
            .as_deref(),
            Some("Could not find consumer for 'iss=tenant-a'")
        );
    }
}
