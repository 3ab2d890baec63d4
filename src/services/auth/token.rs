//! Signed token decoding and verification.
//!
//! Decoding is split from verification: the signing credential is looked up
//! from a claim of the (not yet trusted) payload, and only then can the
//! signature be checked against that credential's key.
use std::collections::BTreeMap;

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation, errors::ErrorKind};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::services::auth::{
    config::RegisteredClaim,
    outcome::Rejection,
    types::{JwtAlgorithm, JwtCredential, KeyKind},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid JWT structure")]
    Structure,
    #[error("invalid base64 in {0}")]
    Base64(&'static str),
    #[error("invalid JSON in {0}")]
    Json(&'static str),
    #[error("invalid alg")]
    Algorithm,
    #[error("invalid header")]
    Header,
}

impl From<DecodeError> for Rejection {
    fn from(e: DecodeError) -> Self {
        Rejection::BadToken(e.to_string())
    }
}

/// Token payload with per-claim presence queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The claim, if present and a string (possibly empty).
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// The claim, if present, a string, and not empty.
    pub fn non_blank_str(&self, name: &str) -> Option<&str> {
        self.get_str(name).filter(|s| !s.is_empty())
    }

    pub fn get_number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A decoded (but unverified) compact JWS.
#[derive(Debug, Clone)]
pub struct Token {
    raw: String,
    pub header: Header,
    /// Raw header object, for header-carried key references.
    pub header_fields: Map<String, Value>,
    pub claims: Claims,
    pub signature: Vec<u8>,
}

fn decode_segment(segment: &str, name: &'static str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| DecodeError::Base64(name))
}

fn decode_object(segment: &str, name: &'static str) -> Result<Map<String, Value>, DecodeError> {
    let bytes = decode_segment(segment, name)?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(DecodeError::Json(name)),
    }
}

impl Token {
    /// Parse `header.payload.signature`.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let parts: Vec<&str> = raw.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
            return Err(DecodeError::Structure);
        };

        let header_fields = decode_object(header_b64, "header")?;
        let known_alg = header_fields
            .get("alg")
            .and_then(Value::as_str)
            .is_some_and(|alg| alg.parse::<Algorithm>().is_ok());
        if !known_alg {
            return Err(DecodeError::Algorithm);
        }
        // alg is fine here, so a failure is a mistyped field (kid, typ, ...)
        let header: Header = serde_json::from_value(Value::Object(header_fields.clone()))
            .map_err(|_| DecodeError::Header)?;

        let claims = Claims::from(decode_object(payload_b64, "claims")?);
        let signature = decode_segment(signature_b64, "signature")?;

        Ok(Self {
            raw: raw.to_string(),
            header,
            header_fields,
            claims,
            signature,
        })
    }

    /// The token's declared `alg` must be the credential's algorithm.
    fn ensure_algorithm(&self, algorithm: JwtAlgorithm) -> Result<(), Rejection> {
        if self.header.alg != algorithm.jwt_algorithm() {
            return Err(Rejection::InvalidAlgorithm);
        }
        Ok(())
    }

    /// Verify the signature with the credential's key.
    ///
    /// The token must declare exactly the credential's algorithm; anything else is
    /// rejected before any signature computation (no algorithm substitution).
    pub fn verify_signature(
        &self,
        algorithm: JwtAlgorithm,
        key: &DecodingKey,
    ) -> Result<(), Rejection> {
        self.ensure_algorithm(algorithm)?;

        // Only the signature is checked here; registered claims are checked separately
        // so all violations can be reported together.
        let mut validation = Validation::new(algorithm.jwt_algorithm());
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        match jsonwebtoken::decode::<Value>(&self.raw, key, &validation) {
            Ok(_) => Ok(()),
            Err(e) => Err(match e.kind() {
                ErrorKind::InvalidSignature => Rejection::InvalidSignature,
                ErrorKind::InvalidAlgorithm => Rejection::InvalidAlgorithm,
                ErrorKind::InvalidRsaKey(_)
                | ErrorKind::InvalidEcdsaKey
                | ErrorKind::InvalidKeyFormat => Rejection::InvalidKeyMaterial,
                _ => Rejection::BadToken(e.to_string()),
            }),
        }
    }

    /// Check each configured registered claim against `now` (unix seconds).
    ///
    /// Every violation is collected, keyed by claim name.
    pub fn verify_registered_claims(
        &self,
        claims_to_verify: &[RegisteredClaim],
        now: i64,
    ) -> Result<(), Rejection> {
        let mut errors = BTreeMap::new();
        let now = now as f64;

        for claim in claims_to_verify {
            let name = claim.name();
            let reason = match (self.claims.get(name), self.claims.get_number(name)) {
                (None, _) => Some("missing"),
                (Some(_), None) => Some("must be a number"),
                (Some(_), Some(value)) => match claim {
                    RegisteredClaim::Exp if value <= now => Some("token expired"),
                    RegisteredClaim::Nbf if value > now => Some("token not valid yet"),
                    _ => None,
                },
            };

            if let Some(reason) = reason {
                errors.insert(name.to_string(), reason.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Rejection::InvalidClaims(errors))
        }
    }

    /// Reject tokens whose `exp` lies more than `maximum` seconds ahead.
    pub fn verify_maximum_expiration(&self, maximum: u64, now: i64) -> Result<(), Rejection> {
        if maximum == 0 {
            return Ok(());
        }

        let Some(exp) = self.claims.get_number("exp") else {
            return Err(Rejection::InvalidClaims(BTreeMap::from([(
                "exp".to_string(),
                "must be a number".to_string(),
            )])));
        };

        if exp - now as f64 > maximum as f64 {
            return Err(Rejection::ExpirationTooFar(BTreeMap::from([(
                "exp".to_string(),
                "exceeds maximum allowed expiration".to_string(),
            )])));
        }

        Ok(())
    }
}

/// Build the verification key for a credential.
///
/// - HMAC: the stored secret, base64-decoded first when `secret_is_base64`.
/// - Others: the stored PEM public key.
pub fn decoding_key(
    credential: &JwtCredential,
    secret_is_base64: bool,
) -> Result<DecodingKey, Rejection> {
    let material = credential
        .key_material()
        .ok_or(Rejection::InvalidKeyMaterial)?;

    match credential.algorithm.key_kind() {
        KeyKind::Symmetric => {
            if secret_is_base64 {
                let secret = STANDARD
                    .decode(material)
                    .map_err(|_| Rejection::UndecodableSecret)?;
                Ok(DecodingKey::from_secret(&secret))
            } else {
                Ok(DecodingKey::from_secret(material.as_bytes()))
            }
        }
        KeyKind::Asymmetric => {
            let pem = material.as_bytes();
            let key = match credential.algorithm {
                JwtAlgorithm::Es256 | JwtAlgorithm::Es384 => DecodingKey::from_ec_pem(pem),
                JwtAlgorithm::EdDsa => DecodingKey::from_ed_pem(pem),
                _ => DecodingKey::from_rsa_pem(pem),
            };
            key.map_err(|_| Rejection::InvalidKeyMaterial)
        }
    }
}
