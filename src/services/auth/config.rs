use std::{fmt, str::FromStr};

/// Registered claims the verifier knows how to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisteredClaim {
    /// `exp`: must be a number strictly in the future.
    Exp,
    /// `nbf`: must be a number not in the future.
    Nbf,
}

impl RegisteredClaim {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exp => "exp",
            Self::Nbf => "nbf",
        }
    }
}

impl fmt::Display for RegisteredClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RegisteredClaim {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exp" => Ok(Self::Exp),
            "nbf" => Ok(Self::Nbf),
            other => Err(format!("unsupported registered claim: {other}")),
        }
    }
}

/// Per-instance settings of the JWT authentication layer.
///
/// Kept separate from the process `Config` so several layers with different
/// settings can run in the same chain, and so the core stays testable.
#[derive(Debug, Clone)]
pub struct JwtAuthConfig {
    /// Query parameters checked for a token, in order.
    pub uri_param_names: Vec<String>,
    /// Cookies checked for a token, in order (after query parameters).
    pub cookie_names: Vec<String>,
    /// Claim (or header field) naming the signing credential.
    pub key_claim_name: String,
    pub claims_to_verify: Vec<RegisteredClaim>,
    /// Stored HMAC secrets are base64 encoded.
    pub secret_is_base64: bool,
    /// Consumer id or username to fall back to; empty disables the fallback.
    pub anonymous: String,
    /// Authenticate `OPTIONS` requests too.
    pub run_on_preflight: bool,
    /// Upper bound for `exp - now`, in seconds. `0` disables the check.
    pub maximum_expiration: u64,
}

impl Default for JwtAuthConfig {
    fn default() -> Self {
        Self {
            uri_param_names: vec!["jwt".to_string()],
            cookie_names: Vec::new(),
            key_claim_name: "iss".to_string(),
            claims_to_verify: Vec::new(),
            secret_is_base64: false,
            anonymous: String::new(),
            run_on_preflight: true,
            maximum_expiration: 0,
        }
    }
}

impl JwtAuthConfig {
    pub fn anonymous(&self) -> Option<&str> {
        let anonymous = self.anonymous.trim();
        (!anonymous.is_empty()).then_some(anonymous)
    }
}
