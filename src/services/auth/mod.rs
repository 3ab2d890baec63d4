pub mod authenticator;
pub mod config;
pub mod consumers;
pub mod context;
pub mod credentials;
pub mod derived;
pub mod extractor;
pub mod factory;
pub mod outcome;
pub mod token;
pub mod types;

pub use authenticator::{AuthRequest, JwtAuthenticator};
pub use config::{JwtAuthConfig, RegisteredClaim};
pub use context::RequestContext;
pub use factory::build_authenticator;
pub use outcome::{AuthError, AuthOutcome, Rejection};
