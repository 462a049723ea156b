//! Connection gate: turns a bearer credential into a verified identity

use std::fmt;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::debug;

use super::token::{verify_token, AuthError};

/// Identity a connection was admitted with
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verifies an opaque credential
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// HS256 JWT verifier; the identity is the token's `id` claim
pub struct JwtVerifier {
    secret: String,
}

impl JwtVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        let claims = verify_token(credential, &self.secret)?;
        if claims.id.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(Identity(claims.id))
    }
}

/// Connection refused before admission
#[derive(Debug, thiserror::Error)]
#[error("Authentication error: {0}")]
pub struct AuthenticationError(#[from] pub AuthError);

impl IntoResponse for AuthenticationError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.0.to_string()
        });

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Admits connections whose credential the verifier accepts
#[derive(Clone)]
pub struct ConnectionGate {
    verifier: Arc<dyn IdentityVerifier>,
}

impl ConnectionGate {
    pub fn new(verifier: impl IdentityVerifier + 'static) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }

    pub fn admit(&self, credential: Option<&str>) -> Result<Identity, AuthenticationError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingToken)?;

        self.verifier.verify(credential).map_err(|e| {
            debug!(error = %e, "Credential rejected");
            AuthenticationError(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::issue_token;

    struct AllowList(&'static [&'static str]);

    impl IdentityVerifier for AllowList {
        fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
            self.0
                .iter()
                .find(|c| **c == credential)
                .map(|c| Identity::new(*c))
                .ok_or(AuthError::InvalidToken)
        }
    }

    #[test]
    fn missing_credential_is_refused() {
        let gate = ConnectionGate::new(AllowList(&["ok"]));
        assert_eq!(gate.admit(None).unwrap_err().0, AuthError::MissingToken);
        assert_eq!(gate.admit(Some("  ")).unwrap_err().0, AuthError::MissingToken);
    }

    #[test]
    fn verifier_verdict_is_used() {
        let gate = ConnectionGate::new(AllowList(&["ok"]));
        assert_eq!(gate.admit(Some("ok")).unwrap(), Identity::new("ok"));
        assert_eq!(gate.admit(Some("nope")).unwrap_err().0, AuthError::InvalidToken);
    }

    #[test]
    fn jwt_gate_admits_issued_tokens() {
        let gate = ConnectionGate::new(JwtVerifier::new("s3cret"));
        let token = issue_token("captain", "s3cret", 60).unwrap();
        assert_eq!(gate.admit(Some(&token)).unwrap().as_str(), "captain");

        let foreign = issue_token("captain", "other", 60).unwrap();
        assert!(gate.admit(Some(&foreign)).is_err());
    }

    #[tokio::test]
    async fn refusal_maps_to_unauthorized_json() {
        let response = AuthenticationError(AuthError::InvalidToken).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"error": "Invalid token"}));
    }
}
