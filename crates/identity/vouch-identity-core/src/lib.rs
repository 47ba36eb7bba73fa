//! Core identity types and the upstream provider contract.

mod claims;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub use claims::{ClaimValue, CustomClaims, claims_from_json};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Invalid user info: {0}")]
    InvalidUserInfo(String),

    #[error("Provider misconfigured: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// The verified end user, as reported by the upstream provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Provider-side identifier (`sub`, GitHub numeric id, ...).
    pub id: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub team_memberships: Vec<String>,
}

/// Upstream tokens captured verbatim for optional forwarding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PTokens {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
}

/// Everything a provider produces for a successful callback.
#[derive(Debug, Clone, Default)]
pub struct ProviderIdentity {
    pub user: User,
    pub custom_claims: CustomClaims,
    pub tokens: PTokens,
}

/// The parts of the OAuth2 callback a provider needs to finish the flow.
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    pub code: String,
    /// The `redirect_uri` sent with the authorization request.
    pub redirect_uri: String,
    pub code_verifier: Option<String>,
    /// Raw callback query parameters, for providers that need more than `code`.
    pub query: HashMap<String, String>,
}

/// An upstream OAuth2/OIDC identity service.
///
/// One implementation exists per provider flavour; the login orchestrator
/// depends on nothing else.
#[async_trait]
pub trait Provider: Send + Sync {
    fn provider_id(&self) -> &str;

    /// One-time setup, run at startup before any request is served.
    fn configure(&self) -> IdentityResult<()>;

    /// Whether the authorization request should carry a PKCE challenge.
    fn uses_pkce(&self) -> bool {
        false
    }

    /// Build the provider authorization URL the browser is redirected to.
    fn authorization_url(
        &self,
        state: &str,
        redirect_uri: &str,
        code_challenge: Option<&str>,
    ) -> IdentityResult<String>;

    /// Exchange the callback for the user's identity, claims and tokens.
    async fn get_user_info(&self, request: &CallbackRequest) -> IdentityResult<ProviderIdentity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider;

    #[async_trait]
    impl Provider for StaticProvider {
        fn provider_id(&self) -> &str {
            "static"
        }

        fn configure(&self) -> IdentityResult<()> {
            Ok(())
        }

        fn authorization_url(
            &self,
            state: &str,
            redirect_uri: &str,
            _code_challenge: Option<&str>,
        ) -> IdentityResult<String> {
            Ok(format!("https://idp.test/auth?state={state}&redirect_uri={redirect_uri}"))
        }

        async fn get_user_info(
            &self,
            request: &CallbackRequest,
        ) -> IdentityResult<ProviderIdentity> {
            if request.code.is_empty() {
                return Err(IdentityError::ProviderError("missing code".into()));
            }
            Ok(ProviderIdentity {
                user: User {
                    username: "alice".into(),
                    ..Default::default()
                },
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_provider_contract_object_safety() {
        let provider: Box<dyn Provider> = Box::new(StaticProvider);
        assert!(!provider.uses_pkce());
        assert!(provider.configure().is_ok());

        let url = provider
            .authorization_url("abc", "https://vouch.test/auth", None)
            .unwrap();
        assert!(url.contains("state=abc"));

        let identity = provider
            .get_user_info(&CallbackRequest {
                code: "code".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(identity.user.username, "alice");

        let err = provider
            .get_user_info(&CallbackRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::ProviderError(_)));
    }

    #[test]
    fn test_user_deserializes_without_teams() {
        let user: User = serde_json::from_str(r#"{"username":"bob"}"#).unwrap();
        assert_eq!(user.username, "bob");
        assert!(user.team_memberships.is_empty());
    }
}
