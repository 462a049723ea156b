//! Credential issuance and verification

pub mod gate;
pub mod token;

pub use gate::{AuthenticationError, ConnectionGate, Identity, IdentityVerifier, JwtVerifier};
pub use token::{issue_token, verify_token, AuthError, Claims};
