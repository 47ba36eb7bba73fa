//! Configuration for the vouch server
//!
//! Configuration is layered, later sources winning:
//! - Default values
//! - Configuration file (TOML, `--config`, `VOUCH_CONFIG` or `config.toml`)
//! - Environment variables with the `VOUCH__` prefix, `__` separating
//!   sections, e.g. `VOUCH__JWT__SECRET`
//!
//! The loaded configuration is validated once and then shared read-only.

use anyhow::{Context, Result};
use axum::http::HeaderName;
use chrono::Duration;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vouch_identity_oauth2::OAuth2ProviderConfig;
use vouch_identity_session::{SigningKey, TokenConfig, is_hmac, parse_algorithm};

/// Minimum HMAC secret length, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

const ENV_PREFIX: &str = "VOUCH";
const CONFIG_PATH_ENV: &str = "VOUCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Keys read from the environment as comma separated lists.
const LIST_KEYS: &[&str] = &[
    "vouch.whitelist",
    "vouch.team_whitelist",
    "vouch.domains",
    "headers.claims",
    "oauth.callback_urls",
    "oauth.scopes",
];

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// Authorization policy and request handling behaviour
    pub vouch: VouchConfig,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub session: SessionConfig,
    pub headers: HeadersConfig,
    pub oauth: OAuthConfig,
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_listen")]
    pub listen: IpAddr,

    /// Port to bind to (default: 9090)
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VouchConfig {
    /// Permit every user the provider authenticates
    pub allow_all_users: bool,

    /// Let `/validate` pass unauthenticated requests with an empty user header
    pub public_access: bool,

    /// Usernames permitted to log in
    pub whitelist: Vec<String>,

    /// Teams or groups whose members are permitted to log in
    pub team_whitelist: Vec<String>,

    /// Domains under management, both for email policy and site authorization
    pub domains: Vec<String>,

    /// Render redirects as pages instead of issuing 302s
    pub testing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Shared secret for HS256/HS384/HS512
    pub secret: String,

    #[serde(default = "default_signing_method")]
    pub signing_method: String,

    /// PEM private key for RS*/PS*/ES*/EdDSA
    pub private_key_file: Option<PathBuf>,

    /// PEM public key for RS*/PS*/ES*/EdDSA
    pub public_key_file: Option<PathBuf>,

    /// Token lifetime in minutes (default: 240)
    #[serde(default = "default_jwt_max_age")]
    pub max_age_minutes: i64,

    #[serde(default = "default_issuer")]
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    #[serde(default = "default_cookie_name")]
    pub name: String,

    pub domain: Option<String>,

    #[serde(default = "default_true")]
    pub secure: bool,

    #[serde(default = "default_true")]
    pub http_only: bool,

    /// Strict, Lax or None
    #[serde(default = "default_same_site")]
    pub same_site: Option<String>,

    /// Defaults to the token lifetime
    pub max_age_minutes: Option<i64>,
}

/// Login-attempt session cookie and store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(default = "default_session_name")]
    pub name: String,

    #[serde(default = "default_session_max_age")]
    pub max_age_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadersConfig {
    /// Request header that may carry the token
    #[serde(default = "default_jwt_header")]
    pub jwt: String,

    /// Query parameter that may carry the token
    #[serde(default = "default_querystring")]
    pub querystring: String,

    #[serde(default = "default_user_header")]
    pub user: String,

    #[serde(default = "default_success_header")]
    pub success: String,

    /// Header for the upstream access token, not sent when unset
    pub access_token: Option<String>,

    /// Header for the upstream ID token, not sent when unset
    pub id_token: Option<String>,

    /// Custom claims projected into response headers
    pub claims: Vec<String>,

    #[serde(default = "default_claim_header_prefix")]
    pub claim_header_prefix: String,

    /// Explicit claim to header names, overriding the derived ones
    pub claim_headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// oidc, google or github
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub user_info_url: Option<String>,
    /// Callback URLs served by this instance, one per managed domain
    pub callback_urls: Vec<String>,
    /// Overrides the provider's default scopes when non-empty
    pub scopes: Vec<String>,
    pub use_pkce: bool,
    pub username_claim: Option<String>,
    pub groups_claim: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    pub auth_params: HashMap<String, String>,
}

// Default value functions
fn default_listen() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    9090
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_signing_method() -> String {
    "HS256".to_string()
}

fn default_jwt_max_age() -> i64 {
    240
}

fn default_issuer() -> Option<String> {
    Some("Vouch".to_string())
}

fn default_cookie_name() -> String {
    "VouchCookie".to_string()
}

fn default_same_site() -> Option<String> {
    Some("Lax".to_string())
}

fn default_session_name() -> String {
    "VouchSession".to_string()
}

fn default_session_max_age() -> u64 {
    300
}

fn default_jwt_header() -> String {
    "X-Vouch-Token".to_string()
}

fn default_querystring() -> String {
    "access_token".to_string()
}

fn default_user_header() -> String {
    "X-Vouch-User".to_string()
}

fn default_success_header() -> String {
    "X-Vouch-Success".to_string()
}

fn default_claim_header_prefix() -> String {
    "X-Vouch-IdP-Claims-".to_string()
}

fn default_http_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            signing_method: default_signing_method(),
            private_key_file: None,
            public_key_file: None,
            max_age_minutes: default_jwt_max_age(),
            issuer: default_issuer(),
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            domain: None,
            secure: true,
            http_only: true,
            same_site: default_same_site(),
            max_age_minutes: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_session_name(),
            max_age_seconds: default_session_max_age(),
        }
    }
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            jwt: default_jwt_header(),
            querystring: default_querystring(),
            user: default_user_header(),
            success: default_success_header(),
            access_token: None,
            id_token: None,
            claims: Vec::new(),
            claim_header_prefix: default_claim_header_prefix(),
            claim_headers: BTreeMap::new(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: None,
            token_url: None,
            user_info_url: None,
            callback_urls: Vec::new(),
            scopes: Vec::new(),
            use_pkce: false,
            username_claim: None,
            groups_claim: None,
            http_timeout_seconds: default_http_timeout(),
            auth_params: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load configuration, reading environment variables from `env` instead
    /// of the process environment when given
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let (config_path, required) = Self::config_file(path);
        if required || config_path.exists() {
            info!("Loading configuration from {}", config_path.display());
            builder = builder.add_source(
                File::from(config_path.as_path())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        } else {
            debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
        }

        let mut environment = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }
        builder = builder.add_source(environment.source(env));

        let config = builder.build().context("Failed to build configuration")?;

        let settings: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// The file to read and whether it must exist
    fn config_file(path: Option<&Path>) -> (PathBuf, bool) {
        if let Some(path) = path {
            return (path.to_path_buf(), true);
        }
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => (PathBuf::from(path), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        let algorithm = parse_algorithm(&self.jwt.signing_method)
            .with_context(|| format!("Invalid jwt.signing_method '{}'", self.jwt.signing_method))?;
        if is_hmac(algorithm) {
            if self.jwt.secret.len() < MIN_SECRET_LEN {
                anyhow::bail!(
                    "jwt.secret must be at least {} characters for {}",
                    MIN_SECRET_LEN,
                    self.jwt.signing_method
                );
            }
        } else if self.jwt.private_key_file.is_none() || self.jwt.public_key_file.is_none() {
            anyhow::bail!(
                "jwt.private_key_file and jwt.public_key_file are required for {}",
                self.jwt.signing_method
            );
        }

        if self.jwt.max_age_minutes <= 0 {
            anyhow::bail!("jwt.max_age_minutes must be positive");
        }
        if self.cookie.max_age_minutes.is_some_and(|m| m <= 0) {
            anyhow::bail!("cookie.max_age_minutes must be positive");
        }
        if self.session.max_age_seconds == 0 {
            anyhow::bail!("session.max_age_seconds must be positive");
        }
        if !self.vouch.allow_all_users && self.sites().is_empty() {
            anyhow::bail!(
                "vouch.domains (or cookie.domain) is required unless vouch.allow_all_users is set"
            );
        }
        if self.cookie.name.is_empty() || self.session.name.is_empty() {
            anyhow::bail!("cookie.name and session.name cannot be empty");
        }
        if self.cookie.name == self.session.name {
            anyhow::bail!("cookie.name and session.name must differ");
        }
        if let Some(same_site) = &self.cookie.same_site {
            let valid = ["strict", "lax", "none"];
            if !valid.contains(&same_site.to_lowercase().as_str()) {
                anyhow::bail!(
                    "Invalid cookie.same_site '{}'. Must be one of: Strict, Lax, None",
                    same_site
                );
            }
        }

        if OAuth2ProviderConfig::preset(&self.oauth.provider).is_err() {
            anyhow::bail!(
                "Invalid oauth.provider '{}'. Must be one of: {:?}",
                self.oauth.provider,
                OAuth2ProviderConfig::supported_providers().collect::<Vec<_>>()
            );
        }
        if self.oauth.client_id.is_empty() {
            anyhow::bail!("oauth.client_id is required");
        }
        if self.oauth.callback_urls.is_empty() {
            anyhow::bail!("oauth.callback_urls must list at least one callback URL");
        }
        if self.oauth.http_timeout_seconds == 0 {
            anyhow::bail!("oauth.http_timeout_seconds must be positive");
        }

        for name in [&self.headers.user, &self.headers.success, &self.headers.jwt]
            .into_iter()
            .chain(self.headers.access_token.iter())
            .chain(self.headers.id_token.iter())
        {
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name '{}'", name))?;
        }
        for (claim, header) in self.claim_headers() {
            HeaderName::from_bytes(header.as_bytes()).with_context(|| {
                format!("Invalid header name '{}' for claim '{}'", header, claim)
            })?;
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !self.logging.is_filter_directive() && !valid_levels.contains(&level_lower.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let valid_formats = ["pretty", "json", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        Ok(())
    }

    /// Get the socket address for the server
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.server.listen, self.server.port))
    }

    /// Get the log filter string for tracing
    pub fn log_filter(&self) -> String {
        if self.logging.is_filter_directive() {
            self.logging.level.clone()
        } else {
            format!("{},hyper=warn,h2=warn", self.logging.level)
        }
    }

    /// Claim name to response header name, in a stable order
    pub fn claim_headers(&self) -> Vec<(String, String)> {
        let mut headers: BTreeMap<String, String> = self
            .headers
            .claims
            .iter()
            .map(|claim| {
                (
                    claim.clone(),
                    format!(
                        "{}{}",
                        self.headers.claim_header_prefix,
                        clean_header_name(claim)
                    ),
                )
            })
            .collect();

        for (claim, header) in &self.headers.claim_headers {
            headers.insert(claim.clone(), header.clone());
        }

        headers.into_iter().collect()
    }

    /// Settings that load fine but are unlikely to do what the operator wants
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.oauth.provider == "github"
            && !self.vouch.team_whitelist.is_empty()
            && self.oauth.groups_claim.is_none()
        {
            warnings.push(
                "vouch.team_whitelist with the github provider: GitHub's user info carries no team memberships unless oauth.groups_claim names a field that does, so every user will be denied"
                    .to_string(),
            );
        }
        warnings
    }

    /// Hosts every issued token is valid for
    pub fn sites(&self) -> Vec<String> {
        let mut sites = self.vouch.domains.clone();
        if let Some(domain) = &self.cookie.domain {
            let domain = domain.trim_start_matches('.');
            if !domain.is_empty() && !sites.iter().any(|site| site == domain) {
                sites.push(domain.to_string());
            }
        }
        sites
    }

    pub fn cookie_max_age(&self) -> Duration {
        Duration::minutes(self.cookie.max_age_minutes.unwrap_or(self.jwt.max_age_minutes))
    }

    /// Signing configuration for the token manager, reading key files as needed
    pub fn token_config(&self) -> Result<TokenConfig> {
        let algorithm = parse_algorithm(&self.jwt.signing_method)?;

        let signing_key = if is_hmac(algorithm) {
            SigningKey::Secret(self.jwt.secret.clone())
        } else {
            let (Some(private), Some(public)) =
                (&self.jwt.private_key_file, &self.jwt.public_key_file)
            else {
                anyhow::bail!("key files are required for {}", self.jwt.signing_method);
            };
            SigningKey::Pem {
                private: std::fs::read(private)
                    .with_context(|| format!("Failed to read {}", private.display()))?,
                public: std::fs::read(public)
                    .with_context(|| format!("Failed to read {}", public.display()))?,
            }
        };

        Ok(TokenConfig {
            algorithm,
            signing_key,
            ttl: Duration::minutes(self.jwt.max_age_minutes),
            issuer: self.jwt.issuer.clone(),
            sites: self.sites(),
        })
    }

    /// The provider preset with any endpoint, scope and claim overrides applied
    pub fn provider_config(&self) -> Result<OAuth2ProviderConfig> {
        let oauth = &self.oauth;
        let mut provider = OAuth2ProviderConfig::preset(&oauth.provider)?;

        provider.client_id = oauth.client_id.clone();
        provider.client_secret = oauth.client_secret.clone();
        if let Some(url) = &oauth.auth_url {
            provider.authorization_endpoint = url.clone();
        }
        if let Some(url) = &oauth.token_url {
            provider.token_endpoint = url.clone();
        }
        if let Some(url) = &oauth.user_info_url {
            provider.userinfo_endpoint = Some(url.clone());
        }
        if !oauth.scopes.is_empty() {
            provider.scopes = oauth.scopes.clone();
        }
        if let Some(claim) = &oauth.username_claim {
            provider.user_info_mapping.username_field = claim.clone();
        }
        if let Some(claim) = &oauth.groups_claim {
            provider.user_info_mapping.groups_field = claim.clone();
        }
        provider.use_pkce = oauth.use_pkce;
        provider.http_timeout_seconds = oauth.http_timeout_seconds;
        provider.auth_params.extend(oauth.auth_params.clone());

        Ok(provider)
    }
}

impl LoggingConfig {
    fn is_filter_directive(&self) -> bool {
        self.level.contains('=') || self.level.contains(',')
    }
}

/// Replace every character outside `[A-Za-z0-9-]` with `-`.
pub fn clean_header_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
