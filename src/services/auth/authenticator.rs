//! JWT authentication pipeline.
//!
//! extract → decode → resolve credential → verify signature → verify claims
//! → resolve consumer → write upstream headers.
//!
//! Each stage may stop the pipeline with a `Rejection` (401/403) or an
//! `AuthError` (500). Only rejections can be replaced by the anonymous fallback.
use axum::http::{HeaderMap, HeaderValue, Method};
use chrono::Utc;
use tracing::{debug, warn};

use crate::services::auth::{
    config::JwtAuthConfig,
    consumers::ConsumerResolver,
    context::{
        ANONYMOUS_CONSUMER, CONSUMER_CUSTOM_ID, CONSUMER_ID, CONSUMER_USERNAME,
        CREDENTIAL_IDENTIFIER, RequestContext,
    },
    credentials::CredentialResolver,
    derived::DerivedHeaders,
    extractor::{ExtractedToken, extract_token},
    outcome::{AuthError, AuthOutcome, Failure, Rejection},
    token::{Claims, Token, decoding_key},
    types::{Consumer, JwtCredential},
};

/// The parts of a request the pipeline reads.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub method: &'a Method,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
}

#[derive(Debug)]
struct Verified {
    consumer: Consumer,
    credential: JwtCredential,
    claims: Claims,
}

#[derive(Debug, Clone)]
pub struct JwtAuthenticator {
    config: JwtAuthConfig,
    credentials: CredentialResolver,
    consumers: ConsumerResolver,
}

impl JwtAuthenticator {
    pub fn new(
        config: JwtAuthConfig,
        credentials: CredentialResolver,
        consumers: ConsumerResolver,
    ) -> Self {
        Self {
            config,
            credentials,
            consumers,
        }
    }

    pub fn config(&self) -> &JwtAuthConfig {
        &self.config
    }

    pub async fn authenticate(
        &self,
        req: AuthRequest<'_>,
        ctx: &mut RequestContext,
    ) -> Result<AuthOutcome, AuthError> {
        self.authenticate_at(req, ctx, Utc::now().timestamp()).await
    }

    /// Same as [`authenticate`](Self::authenticate) with an explicit clock (unix seconds).
    pub async fn authenticate_at(
        &self,
        req: AuthRequest<'_>,
        ctx: &mut RequestContext,
        now: i64,
    ) -> Result<AuthOutcome, AuthError> {
        if !self.config.run_on_preflight && *req.method == Method::OPTIONS {
            return Ok(AuthOutcome::Skipped);
        }

        // Logical OR between auth layers: a previous layer already authenticated
        // the request and this one would fall back to anonymous anyway.
        if self.config.anonymous().is_some() && ctx.is_authenticated() {
            debug!("request already authenticated, skipping jwt layer");
            return Ok(AuthOutcome::Skipped);
        }

        let rejection = match self.verify(req, now).await {
            Ok(Verified {
                consumer,
                credential,
                claims,
            }) => {
                attach(ctx, &consumer, Some(&credential), Some(&claims));
                return Ok(AuthOutcome::Authenticated {
                    consumer,
                    credential: Some(credential),
                });
            }
            Err(Failure::Fatal(err)) => {
                warn!(error = %err, "jwt authentication failed");
                return Err(err);
            }
            Err(Failure::Rejected(rejection)) => rejection,
        };

        let Some(anonymous) = self.config.anonymous() else {
            debug!(reason = %rejection, "jwt authentication rejected");
            return Ok(AuthOutcome::Rejected(rejection));
        };

        debug!(reason = %rejection, "falling back to anonymous consumer");
        let consumer = self
            .consumers
            .resolve_anonymous(anonymous)
            .await
            .inspect_err(|err| {
                warn!(error = %err, anonymous, "anonymous fallback failed");
            })?;

        attach(ctx, &consumer, None, None);
        Ok(AuthOutcome::Authenticated {
            consumer,
            credential: None,
        })
    }

    async fn verify(&self, req: AuthRequest<'_>, now: i64) -> Result<Verified, Failure> {
        let raw = match extract_token(&self.config, req.query, req.headers)? {
            ExtractedToken::None => return Err(Rejection::NoToken.into()),
            ExtractedToken::Multiple(_) => return Err(Rejection::MultipleTokens.into()),
            ExtractedToken::Single(raw) => raw,
        };

        let token = Token::decode(&raw).map_err(Rejection::from)?;
        let key = self.key_reference(&token)?;

        let credential = self
            .credentials
            .resolve(key)
            .await?
            .ok_or_else(|| Rejection::UnknownCredential(self.config.key_claim_name.clone()))?;

        let decoding_key = decoding_key(&credential, self.config.secret_is_base64)?;
        token.verify_signature(credential.algorithm, &decoding_key)?;

        token.verify_registered_claims(&self.config.claims_to_verify, now)?;
        token.verify_maximum_expiration(self.config.maximum_expiration, now)?;

        let consumer = self
            .consumers
            .resolve_id(credential.consumer_id)
            .await?
            .ok_or_else(|| Rejection::UnknownConsumer {
                claim: self.config.key_claim_name.clone(),
                value: key.to_string(),
            })?;

        Ok(Verified {
            consumer,
            credential,
            claims: token.claims.clone(),
        })
    }

    /// The credential key: the configured claim, else the header field of the same name.
    fn key_reference<'t>(&self, token: &'t Token) -> Result<&'t str, Rejection> {
        let name = &self.config.key_claim_name;
        let value = token
            .claims
            .get(name)
            .or_else(|| token.header_fields.get(name))
            .ok_or_else(|| Rejection::MissingKeyClaim(name.clone()))?;

        value
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Rejection::InvalidKeyClaim(name.clone()))
    }
}

/// Record the consumer on the context and queue the identity headers.
fn attach(
    ctx: &mut RequestContext,
    consumer: &Consumer,
    credential: Option<&JwtCredential>,
    claims: Option<&Claims>,
) {
    let headers = &mut ctx.upstream_headers;

    headers.set_or_clear(CONSUMER_ID, Some(consumer.id.to_string().as_str()));
    headers.set_or_clear(CONSUMER_CUSTOM_ID, consumer.custom_id.as_deref());
    headers.set_or_clear(CONSUMER_USERNAME, consumer.username.as_deref());

    match credential {
        Some(credential) => {
            headers.set_or_clear(CREDENTIAL_IDENTIFIER, Some(credential.key.as_str()));
            headers.clear(ANONYMOUS_CONSUMER);
        }
        None => {
            headers.clear(CREDENTIAL_IDENTIFIER);
            headers.set(ANONYMOUS_CONSUMER, HeaderValue::from_static("true"));
        }
    }

    claims
        .map(DerivedHeaders::from_claims)
        .unwrap_or_default()
        .write_to(headers);

    ctx.consumer = Some(consumer.clone());
    ctx.credential = credential.cloned();
}
