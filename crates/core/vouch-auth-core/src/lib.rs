//! Authentication and authorization errors for the vouch edge service.
//!
//! Every failure the request validator and the login orchestrator can hit is
//! a variant of [`AuthError`]. The HTTP layer decides how each variant is
//! surfaced; this crate only classifies them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while authenticating or authorizing a request.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    /// No proof token was found in the cookie, headers, or query string.
    #[error("no jwt found in request")]
    NoTokenPresent,

    /// The token signature, structure, or time claims did not verify.
    #[error("invalid token")]
    InvalidToken,

    /// The token verified but required claims are missing.
    #[error("malformed claims: {0}")]
    MalformedClaims(String),

    /// The token is not valid for the requested host.
    #[error(
        "http header 'Host: {host}' not authorized for configured `vouch.domains` (is Host being sent properly?)"
    )]
    SiteNotAuthorized { host: String },

    /// The `state` returned by the provider does not match the stored nonce.
    #[error("Invalid session state.")]
    StateNonceMismatch,

    /// The upstream provider returned an error or could not be reached.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// The authorization policy rejected the identity.
    #[error("{0}")]
    PolicyDenied(String),

    /// A configured mapping could not be applied.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// An internal error occurred, e.g. no randomness was available.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Failures of the request-validation path.
    ///
    /// All of these collapse to the same externally visible outcome: a 401
    /// (or an anonymous pass-through when public access is enabled).
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::NoTokenPresent
                | AuthError::InvalidToken
                | AuthError::MalformedClaims(_)
                | AuthError::SiteNotAuthorized { .. }
        )
    }

    /// Failures of the login/callback flow that end on an informational page.
    pub fn is_login_failure(&self) -> bool {
        matches!(
            self,
            AuthError::StateNonceMismatch | AuthError::ProviderError(_) | AuthError::PolicyDenied(_)
        )
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failures_are_classified() {
        assert!(AuthError::NoTokenPresent.is_authentication_failure());
        assert!(AuthError::InvalidToken.is_authentication_failure());
        assert!(AuthError::MalformedClaims("username".into()).is_authentication_failure());
        assert!(
            AuthError::SiteNotAuthorized {
                host: "b.example.com".into()
            }
            .is_authentication_failure()
        );
        assert!(!AuthError::StateNonceMismatch.is_authentication_failure());
        assert!(!AuthError::ConfigurationError("x".into()).is_authentication_failure());
    }

    #[test]
    fn test_login_failures_are_classified() {
        assert!(AuthError::StateNonceMismatch.is_login_failure());
        assert!(AuthError::ProviderError("timeout".into()).is_login_failure());
        assert!(AuthError::PolicyDenied("nope".into()).is_login_failure());
        assert!(!AuthError::InvalidToken.is_login_failure());
    }

    #[test]
    fn test_site_not_authorized_names_host() {
        let err = AuthError::SiteNotAuthorized {
            host: "evil.example.org".into(),
        };
        assert!(err.to_string().contains("Host: evil.example.org"));
    }
}
