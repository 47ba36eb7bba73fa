//! Application state shared across handlers.

use crate::config::Config;
use crate::cookie::CookieSettings;
use crate::domains::Domains;
use crate::policy::PolicyTier;
use anyhow::{Context, Result};
use axum::http::HeaderName;
use std::sync::Arc;
use tracing::{info, warn};
use vouch_identity_core::Provider;
use vouch_identity_oauth2::{InMemorySessionStore, OAuth2Provider, SessionStore};
use vouch_identity_session::TokenManager;

/// Response and request header names, parsed once.
#[derive(Debug, Clone)]
pub struct HeaderNames {
    pub jwt: HeaderName,
    pub user: HeaderName,
    pub success: HeaderName,
    pub access_token: Option<HeaderName>,
    pub id_token: Option<HeaderName>,
    /// Custom claim name and the header it is projected into.
    pub claims: Vec<(String, HeaderName)>,
}

impl HeaderNames {
    fn from_config(config: &Config) -> Result<Self> {
        let parse = |name: &str| {
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name '{}'", name))
        };

        Ok(Self {
            jwt: parse(&config.headers.jwt)?,
            user: parse(&config.headers.user)?,
            success: parse(&config.headers.success)?,
            access_token: config.headers.access_token.as_deref().map(parse).transpose()?,
            id_token: config.headers.id_token.as_deref().map(parse).transpose()?,
            claims: config
                .claim_headers()
                .into_iter()
                .map(|(claim, header)| -> Result<(String, HeaderName)> {
                    Ok((claim, parse(&header)?))
                })
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

/// Everything a handler needs; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: Arc<dyn Provider>,
    pub tokens: Arc<TokenManager>,
    pub sessions: Arc<dyn SessionStore>,
    pub domains: Arc<Domains>,
    pub headers: Arc<HeaderNames>,
    pub proof_cookie: CookieSettings,
    pub session_cookie: CookieSettings,
}

impl AppState {
    /// Build the state with the provider named in the configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let provider = OAuth2Provider::new(config.provider_config()?)
            .context("Failed to create OAuth2 provider")?;
        Self::new(config, Arc::new(provider))
    }

    /// Build the state around an already constructed provider.
    pub fn new(config: Config, provider: Arc<dyn Provider>) -> Result<Self> {
        provider
            .configure()
            .with_context(|| format!("Failed to configure provider '{}'", provider.provider_id()))?;

        let tokens = TokenManager::new(config.token_config()?)
            .context("Failed to create token manager")?;
        let sessions: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::new(config.session.max_age_seconds));

        if PolicyTier::select(&config.vouch) == PolicyTier::DefaultOpen {
            warn!(
                "No allow_all_users, whitelist, team_whitelist or domains configured: any user the provider authenticates will be authorized"
            );
        }
        for warning in config.warnings() {
            warn!("{}", warning);
        }
        if config.vouch.public_access {
            info!("Public access is enabled, unauthenticated requests pass /validate");
        }

        Ok(Self {
            headers: Arc::new(HeaderNames::from_config(&config)?),
            domains: Arc::new(Domains::new(&config.vouch.domains)),
            proof_cookie: CookieSettings::proof_token(&config),
            session_cookie: CookieSettings::session(&config),
            tokens: Arc::new(tokens),
            sessions,
            provider,
            config: Arc::new(config),
        })
    }
}
