//! OAuth2/OIDC implementation of the [`Provider`] contract.

use crate::client::OAuth2Client;
use crate::config::{OAuth2ProviderConfig, UserInfoMapping};
use crate::error::{OAuth2Error, OAuth2Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;
use vouch_identity_core::{
    CallbackRequest, ClaimValue, CustomClaims, IdentityError, IdentityResult, PTokens, Provider,
    ProviderIdentity, User, claims_from_json,
};

/// Provider adapter driven entirely by an [`OAuth2ProviderConfig`].
#[derive(Clone)]
pub struct OAuth2Provider {
    config: OAuth2ProviderConfig,
    client: OAuth2Client,
}

impl OAuth2Provider {
    pub fn new(config: OAuth2ProviderConfig) -> OAuth2Result<Self> {
        let client = OAuth2Client::new(config.http_timeout_seconds)?;
        Ok(Self { config, client })
    }

    /// Map the merged userinfo/ID-token document to a [`User`] and its claims.
    fn map_user_info(&self, document: Map<String, Value>) -> OAuth2Result<(User, CustomClaims)> {
        let mapping = &self.config.user_info_mapping;

        let username = string_field(&document, &mapping.username_field).ok_or_else(|| {
            OAuth2Error::InvalidUserInfoResponse(format!(
                "user info has no '{}' to use as username",
                mapping.username_field
            ))
        })?;

        let user = User {
            username,
            email: string_field(&document, &mapping.email_field),
            name: string_field(&document, &mapping.name_field),
            id: string_field(&document, &mapping.id_field),
            avatar_url: string_field(&document, &mapping.picture_field),
            team_memberships: team_memberships(&document, mapping),
        };

        let custom_claims = claims_from_json(&Value::Object(document));

        Ok((user, custom_claims))
    }

    async fn fetch_identity(&self, request: &CallbackRequest) -> OAuth2Result<ProviderIdentity> {
        let token_response = self
            .client
            .exchange_code(
                &self.config,
                &request.code,
                &request.redirect_uri,
                request.code_verifier.as_deref(),
            )
            .await?;

        let mut document = Map::new();
        if self.config.use_id_token_claims {
            if let Some(id_token) = &token_response.id_token {
                match id_token_payload(id_token) {
                    Some(payload) => document.extend(payload),
                    None => warn!("ID token payload could not be decoded, ignoring its claims"),
                }
            }
        }

        if self.config.userinfo_endpoint.is_some() {
            let user_info = self
                .client
                .get_user_info(&self.config, &token_response.access_token)
                .await?;
            if let Value::Object(fields) = user_info {
                document.extend(fields);
            }
        }

        let (user, custom_claims) = self.map_user_info(document)?;
        debug!(username = %user.username, "Mapped provider user info");

        Ok(ProviderIdentity {
            user,
            custom_claims,
            tokens: PTokens {
                access_token: Some(token_response.access_token),
                id_token: token_response.id_token,
            },
        })
    }
}

#[async_trait]
impl Provider for OAuth2Provider {
    fn provider_id(&self) -> &str {
        &self.config.provider_id
    }

    fn configure(&self) -> IdentityResult<()> {
        if self.config.client_id.is_empty() {
            return Err(IdentityError::Configuration(
                "oauth client_id is required".to_string(),
            ));
        }

        Url::parse(&self.config.authorization_endpoint).map_err(|e| {
            IdentityError::Configuration(format!("invalid authorization endpoint: {e}"))
        })?;
        Url::parse(&self.config.token_endpoint)
            .map_err(|e| IdentityError::Configuration(format!("invalid token endpoint: {e}")))?;

        match &self.config.userinfo_endpoint {
            Some(endpoint) => {
                Url::parse(endpoint).map_err(|e| {
                    IdentityError::Configuration(format!("invalid userinfo endpoint: {e}"))
                })?;
            }
            None if self.config.use_id_token_claims => {
                info!("No userinfo endpoint configured, identity comes from the ID token only");
            }
            None => {
                return Err(IdentityError::Configuration(
                    "a userinfo endpoint is required for this provider".to_string(),
                ));
            }
        }

        info!(provider = %self.config.provider_id, "Configured OAuth2 provider");
        Ok(())
    }

    fn uses_pkce(&self) -> bool {
        self.config.use_pkce
    }

    fn authorization_url(
        &self,
        state: &str,
        redirect_uri: &str,
        code_challenge: Option<&str>,
    ) -> IdentityResult<String> {
        Ok(self
            .client
            .authorization_url(&self.config, state, redirect_uri, code_challenge)?)
    }

    async fn get_user_info(&self, request: &CallbackRequest) -> IdentityResult<ProviderIdentity> {
        Ok(self.fetch_identity(request).await?)
    }
}

fn string_field(document: &Map<String, Value>, field: &str) -> Option<String> {
    match document.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn team_memberships(document: &Map<String, Value>, mapping: &UserInfoMapping) -> Vec<String> {
    document
        .get(&mapping.groups_field)
        .map(|value| ClaimValue::from(value.clone()).as_strings())
        .unwrap_or_default()
}

/// Decode the payload segment of a JWT without verifying it.
///
/// Only used for ID tokens received directly from the token endpoint over TLS.
fn id_token_payload(id_token: &str) -> Option<Map<String, Value>> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
