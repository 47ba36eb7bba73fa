//! OAuth2 provider configuration and the named provider presets.

use crate::error::{OAuth2Error, OAuth2Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// OAuth2 provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2ProviderConfig {
    pub provider_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: Option<String>,
    pub scopes: Vec<String>,
    /// Additional parameters to include in authorization request
    pub auth_params: HashMap<String, String>,
    /// Whether to use PKCE (recommended for public clients)
    pub use_pkce: bool,
    /// Merge the ID token's payload into the custom claims
    pub use_id_token_claims: bool,
    pub user_info_mapping: UserInfoMapping,
    pub http_timeout_seconds: u64,
}

/// Which userinfo fields populate the [`vouch_identity_core::User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfoMapping {
    pub username_field: String,
    pub email_field: String,
    pub name_field: String,
    pub id_field: String,
    pub picture_field: String,
    pub groups_field: String,
}

impl UserInfoMapping {
    pub fn oidc() -> Self {
        Self {
            username_field: "email".to_string(),
            email_field: "email".to_string(),
            name_field: "name".to_string(),
            id_field: "sub".to_string(),
            picture_field: "picture".to_string(),
            groups_field: "groups".to_string(),
        }
    }

    /// GitHub's `/user` document has no team list, so `groups_field` only
    /// yields memberships when pointed at a field the deployment provides.
    pub fn github() -> Self {
        Self {
            username_field: "login".to_string(),
            email_field: "email".to_string(),
            name_field: "name".to_string(),
            id_field: "id".to_string(),
            picture_field: "avatar_url".to_string(),
            groups_field: "teams".to_string(),
        }
    }
}

impl Default for UserInfoMapping {
    fn default() -> Self {
        Self::oidc()
    }
}

type Preset = fn() -> OAuth2ProviderConfig;

/// Providers selectable by name, in the order they are documented.
const PRESETS: &[(&str, Preset)] = &[
    ("oidc", OAuth2ProviderConfig::oidc),
    ("google", OAuth2ProviderConfig::google),
    ("github", OAuth2ProviderConfig::github),
];

impl OAuth2ProviderConfig {
    /// Look up the defaults for a provider name from configuration.
    pub fn preset(name: &str) -> OAuth2Result<Self> {
        PRESETS
            .iter()
            .find(|(preset, _)| *preset == name)
            .map(|(_, build)| build())
            .ok_or_else(|| OAuth2Error::ConfigError(format!("unknown provider '{}'", name)))
    }

    pub fn supported_providers() -> impl Iterator<Item = &'static str> {
        PRESETS.iter().map(|(name, _)| *name)
    }

    /// Generic OpenID Connect; endpoints must come from configuration.
    pub fn oidc() -> Self {
        Self {
            provider_id: "oidc".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            userinfo_endpoint: None,
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            auth_params: HashMap::new(),
            use_pkce: false,
            use_id_token_claims: true,
            user_info_mapping: UserInfoMapping::oidc(),
            http_timeout_seconds: 10,
        }
    }

    pub fn google() -> Self {
        Self {
            provider_id: "google".to_string(),
            authorization_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_endpoint: Some(
                "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            ),
            ..Self::oidc()
        }
    }

    pub fn github() -> Self {
        Self {
            provider_id: "github".to_string(),
            authorization_endpoint: "https://github.com/login/oauth/authorize".to_string(),
            token_endpoint: "https://github.com/login/oauth/access_token".to_string(),
            userinfo_endpoint: Some("https://api.github.com/user".to_string()),
            scopes: vec!["read:user".to_string()],
            use_id_token_claims: false,
            user_info_mapping: UserInfoMapping::github(),
            ..Self::oidc()
        }
    }
}
