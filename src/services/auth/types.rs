//! Credential and consumer records as the authentication pipeline sees them.
use std::{fmt, str::FromStr};

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signing algorithms a stored JWT credential can be registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JwtAlgorithm {
    #[default]
    #[serde(rename = "HS256")]
    Hs256,
    #[serde(rename = "HS384")]
    Hs384,
    #[serde(rename = "HS512")]
    Hs512,
    #[serde(rename = "RS256")]
    Rs256,
    #[serde(rename = "RS384")]
    Rs384,
    #[serde(rename = "RS512")]
    Rs512,
    #[serde(rename = "ES256")]
    Es256,
    #[serde(rename = "ES384")]
    Es384,
    #[serde(rename = "EdDSA")]
    EdDsa,
}

/// Which key material a credential carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Shared secret (`secret`).
    Symmetric,
    /// PEM-encoded public key (`public_key`).
    Asymmetric,
}

impl JwtAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::EdDsa => "EdDSA",
        }
    }

    pub fn key_kind(&self) -> KeyKind {
        match self {
            Self::Hs256 | Self::Hs384 | Self::Hs512 => KeyKind::Symmetric,
            _ => KeyKind::Asymmetric,
        }
    }

    /// The matching `jsonwebtoken` algorithm.
    pub fn jwt_algorithm(&self) -> Algorithm {
        match self {
            Self::Hs256 => Algorithm::HS256,
            Self::Hs384 => Algorithm::HS384,
            Self::Hs512 => Algorithm::HS512,
            Self::Rs256 => Algorithm::RS256,
            Self::Rs384 => Algorithm::RS384,
            Self::Rs512 => Algorithm::RS512,
            Self::Es256 => Algorithm::ES256,
            Self::Es384 => Algorithm::ES384,
            Self::EdDsa => Algorithm::EdDSA,
        }
    }
}

impl fmt::Display for JwtAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported jwt algorithm: {0}")]
pub struct UnsupportedAlgorithm(pub String);

impl FromStr for JwtAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::Hs256),
            "HS384" => Ok(Self::Hs384),
            "HS512" => Ok(Self::Hs512),
            "RS256" => Ok(Self::Rs256),
            "RS384" => Ok(Self::Rs384),
            "RS512" => Ok(Self::Rs512),
            "ES256" => Ok(Self::Es256),
            "ES384" => Ok(Self::Es384),
            "EdDSA" => Ok(Self::EdDsa),
            other => Err(UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// A registered JWT signing credential owned by a consumer.
///
/// - `secret` is meaningful for HMAC algorithms, `public_key` (PEM) for the others.
/// - Key material is intentionally not printable via Debug.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtCredential {
    pub id: Uuid,
    pub consumer_id: Uuid,
    pub key: String,
    #[serde(default)]
    pub algorithm: JwtAlgorithm,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

impl fmt::Debug for JwtCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("JwtCredential")
            .field("id", &self.id)
            .field("consumer_id", &self.consumer_id)
            .field("key", &self.key)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl JwtCredential {
    /// Key material selected by the credential's algorithm.
    pub fn key_material(&self) -> Option<&str> {
        match self.algorithm.key_kind() {
            KeyKind::Symmetric => self.secret.as_deref(),
            KeyKind::Asymmetric => self.public_key.as_deref(),
        }
    }
}

/// The account a request is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    pub id: Uuid,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}
