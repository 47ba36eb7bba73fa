//! Proof-token management with JWT generation and validation.
//!
//! A proof token is issued once per successful login and presented on every
//! proxied request. It is self-contained: nothing about it is stored
//! server-side.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, error};
use vouch_auth_core::AuthError;
use vouch_identity_core::{CustomClaims, PTokens, User};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("malformed claims: {0}")]
    MalformedClaims(String),

    #[error("token encoding failed: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),

    #[error("invalid signing configuration: {0}")]
    Key(String),
}

pub type TokenResult<T> = Result<T, TokenError>;

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken(_) => AuthError::InvalidToken,
            TokenError::MalformedClaims(msg) => AuthError::MalformedClaims(msg),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

/// The claims carried by a vouch proof token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VouchClaims {
    #[serde(default)]
    pub username: String,
    /// Hosts this token may be presented to.
    #[serde(default)]
    pub sites: Vec<String>,
    #[serde(rename = "CustomClaims", default)]
    pub custom_claims: CustomClaims,
    #[serde(rename = "PAccessToken", default, skip_serializing_if = "String::is_empty")]
    pub p_access_token: String,
    #[serde(rename = "PIdToken", default, skip_serializing_if = "String::is_empty")]
    pub p_id_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

impl VouchClaims {
    /// Whether this token may be used for requests to `host`.
    ///
    /// A site matches the host itself or any subdomain of it. Any `:port`
    /// suffix on the host is ignored and matching is case-sensitive.
    pub fn site_authorized(&self, host: &str) -> bool {
        let host = strip_port(host);
        if host.is_empty() {
            return false;
        }

        self.sites.iter().any(|site| {
            let site = site.trim_start_matches('.');
            !site.is_empty()
                && (host == site
                    || host
                        .strip_suffix(site)
                        .is_some_and(|prefix| prefix.ends_with('.')))
        })
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

/// Token that passed signature and time validation but whose claims have not
/// been mapped yet.
#[derive(Debug, Clone)]
pub struct ParsedToken {
    pub header: Header,
    pub claims: Map<String, Value>,
}

/// Key material for signing and verifying tokens.
#[derive(Clone)]
pub enum SigningKey {
    /// Shared secret for the HS* family.
    Secret(String),
    /// PEM-encoded key pair for the RS*, PS*, ES* and EdDSA families.
    Pem { private: Vec<u8>, public: Vec<u8> },
}

#[derive(Clone)]
pub struct TokenConfig {
    pub algorithm: Algorithm,
    pub signing_key: SigningKey,
    pub ttl: Duration,
    pub issuer: Option<String>,
    /// Sites embedded in every token created.
    pub sites: Vec<String>,
}

impl TokenConfig {
    /// HS256 with the given secret, the most common deployment.
    pub fn hmac(secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            signing_key: SigningKey::Secret(secret.into()),
            ttl,
            issuer: None,
            sites: Vec::new(),
        }
    }

    pub fn with_sites(mut self, sites: Vec<String>) -> Self {
        self.sites = sites;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}

/// Parse a signing method name such as `HS256` or `ES384`.
pub fn parse_algorithm(name: &str) -> TokenResult<Algorithm> {
    Algorithm::from_str(name)
        .map_err(|_| TokenError::Key(format!("unsupported signing method '{name}'")))
}

/// Whether an algorithm signs with a shared secret rather than a key pair.
pub fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

/// Creates and validates proof tokens with one process-wide key.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    issuer: Option<String>,
    sites: Vec<String>,
}

impl TokenManager {
    pub fn new(config: TokenConfig) -> TokenResult<Self> {
        let (encoding_key, decoding_key) = load_keys(config.algorithm, &config.signing_key)?;

        let mut validation = Validation::new(config.algorithm);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self {
            algorithm: config.algorithm,
            encoding_key,
            decoding_key,
            validation,
            ttl: config.ttl,
            issuer: config.issuer,
            sites: config.sites,
        })
    }

    /// Build the claims for a freshly verified identity, expiring one TTL from now.
    pub fn build_claims(
        &self,
        user: &User,
        custom_claims: &CustomClaims,
        tokens: &PTokens,
    ) -> VouchClaims {
        let now = Utc::now();
        VouchClaims {
            username: user.username.clone(),
            sites: self.sites.clone(),
            custom_claims: custom_claims.clone(),
            p_access_token: tokens.access_token.clone().unwrap_or_default(),
            p_id_token: tokens.id_token.clone().unwrap_or_default(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        }
    }

    pub fn create_token(
        &self,
        user: &User,
        custom_claims: &CustomClaims,
        tokens: &PTokens,
    ) -> TokenResult<String> {
        self.sign(&self.build_claims(user, custom_claims, tokens))
    }

    pub fn sign(&self, claims: &VouchClaims) -> TokenResult<String> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key).map_err(|e| {
            error!("Failed to sign proof token: {}", e);
            TokenError::Encoding(e)
        })
    }

    /// Verify the signature, algorithm, expiry, not-before and issuer.
    pub fn parse_token(&self, token: &str) -> TokenResult<ParsedToken> {
        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Proof token rejected: {}", e);
                TokenError::InvalidToken(e)
            })?;

        Ok(ParsedToken {
            header: data.header,
            claims: data.claims,
        })
    }

    /// Map verified claims to [`VouchClaims`]; a username is required.
    pub fn extract_claims(&self, parsed: ParsedToken) -> TokenResult<VouchClaims> {
        let claims: VouchClaims = serde_json::from_value(Value::Object(parsed.claims))
            .map_err(|e| TokenError::MalformedClaims(e.to_string()))?;

        if claims.username.is_empty() {
            return Err(TokenError::MalformedClaims(
                "username claim is missing".to_string(),
            ));
        }

        Ok(claims)
    }

    /// Parse and extract in one step, as done on every proxied request.
    pub fn verify(&self, token: &str) -> TokenResult<VouchClaims> {
        let parsed = self.parse_token(token)?;
        self.extract_claims(parsed)
    }

    pub fn site_authorized(&self, host: &str, claims: &VouchClaims) -> bool {
        claims.site_authorized(host)
    }
}

fn load_keys(algorithm: Algorithm, key: &SigningKey) -> TokenResult<(EncodingKey, DecodingKey)> {
    let invalid = |e: jsonwebtoken::errors::Error| TokenError::Key(e.to_string());

    match (algorithm, key) {
        (alg, SigningKey::Secret(secret)) if is_hmac(alg) => {
            if secret.is_empty() {
                return Err(TokenError::Key("HMAC secret is empty".to_string()));
            }
            Ok((
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
            ))
        }
        (alg, SigningKey::Pem { private, public }) if !is_hmac(alg) => match alg {
            Algorithm::ES256 | Algorithm::ES384 => Ok((
                EncodingKey::from_ec_pem(private).map_err(invalid)?,
                DecodingKey::from_ec_pem(public).map_err(invalid)?,
            )),
            Algorithm::EdDSA => Ok((
                EncodingKey::from_ed_pem(private).map_err(invalid)?,
                DecodingKey::from_ed_pem(public).map_err(invalid)?,
            )),
            _ => Ok((
                EncodingKey::from_rsa_pem(private).map_err(invalid)?,
                DecodingKey::from_rsa_pem(public).map_err(invalid)?,
            )),
        },
        (alg, _) => Err(TokenError::Key(format!(
            "key material does not match signing method {alg:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vouch_identity_core::ClaimValue;

    const SECRET: &str = "a-test-secret-that-is-long-enough";

    fn create_test_manager() -> TokenManager {
        TokenManager::new(
            TokenConfig::hmac(SECRET, Duration::minutes(240))
                .with_sites(vec!["a.example.com".to_string(), "example.org".to_string()]),
        )
        .unwrap()
    }

    fn alice() -> User {
        User {
            username: "alice@example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_token_round_trip() {
        let manager = create_test_manager();

        let mut custom_claims = CustomClaims::new();
        custom_claims.insert(
            "groups".to_string(),
            ClaimValue::List(vec!["a".into(), "b".into()]),
        );
        custom_claims.insert("level".to_string(), ClaimValue::Number(7.into()));

        let tokens = PTokens {
            access_token: Some("upstream-at".to_string()),
            id_token: None,
        };

        let claims = manager.build_claims(&alice(), &custom_claims, &tokens);
        let token = manager.sign(&claims).unwrap();
        let parsed = manager.verify(&token).unwrap();

        assert_eq!(parsed, claims);
        assert_eq!(parsed.p_access_token, "upstream-at");
        assert_eq!(parsed.sites, vec!["a.example.com", "example.org"]);
        assert_eq!(parsed.exp - parsed.iat, 240 * 60);
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let manager = create_test_manager();
        let mut claims = manager.build_claims(&alice(), &CustomClaims::new(), &PTokens::default());
        claims.exp = Utc::now().timestamp() - 1;

        let token = manager.sign(&claims).unwrap();
        assert!(matches!(
            manager.parse_token(&token),
            Err(TokenError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_token_signed_with_other_key_is_invalid() {
        let manager = create_test_manager();
        let other = TokenManager::new(TokenConfig::hmac(
            "a-different-secret-entirely",
            Duration::minutes(5),
        ))
        .unwrap();

        let token = other
            .create_token(&alice(), &CustomClaims::new(), &PTokens::default())
            .unwrap();
        assert!(manager.parse_token(&token).is_err());
        assert!(manager.parse_token("not.a.jwt").is_err());
        assert!(manager.parse_token("").is_err());
    }

    #[test]
    fn test_missing_username_is_malformed() {
        let manager = create_test_manager();
        let claims = manager.build_claims(&User::default(), &CustomClaims::new(), &PTokens::default());
        let token = manager.sign(&claims).unwrap();

        let parsed = manager.parse_token(&token).unwrap();
        let err = manager.extract_claims(parsed).unwrap_err();
        assert!(matches!(err, TokenError::MalformedClaims(_)));
        assert!(matches!(
            AuthError::from(err),
            AuthError::MalformedClaims(_)
        ));
    }

    #[test]
    fn test_issuer_is_enforced() {
        let issuing = TokenManager::new(
            TokenConfig::hmac(SECRET, Duration::minutes(5)).with_issuer("Vouch"),
        )
        .unwrap();
        let token = issuing
            .create_token(&alice(), &CustomClaims::new(), &PTokens::default())
            .unwrap();
        assert_eq!(issuing.verify(&token).unwrap().iss.as_deref(), Some("Vouch"));

        let strict = TokenManager::new(
            TokenConfig::hmac(SECRET, Duration::minutes(5)).with_issuer("Someone Else"),
        )
        .unwrap();
        assert!(strict.verify(&token).is_err());
    }

    #[test]
    fn test_site_authorization() {
        let manager = create_test_manager();
        let claims = manager.build_claims(&alice(), &CustomClaims::new(), &PTokens::default());

        assert!(manager.site_authorized("a.example.com", &claims));
        assert!(manager.site_authorized("a.example.com:8443", &claims));
        assert!(manager.site_authorized("api.example.org", &claims));

        assert!(!manager.site_authorized("b.example.com", &claims));
        assert!(!manager.site_authorized("notexample.org", &claims));
        assert!(!manager.site_authorized("A.EXAMPLE.COM", &claims));
        assert!(!manager.site_authorized("", &claims));
    }

    #[test]
    fn test_empty_sites_authorize_nothing() {
        let claims = VouchClaims {
            username: "u".into(),
            sites: vec![String::new()],
            custom_claims: CustomClaims::new(),
            p_access_token: String::new(),
            p_id_token: String::new(),
            iss: None,
            iat: 0,
            exp: 0,
        };
        assert!(!claims.site_authorized("anything.example.com"));
    }

    #[test]
    fn test_ecdsa_key_pair() {
        let manager = TokenManager::new(TokenConfig {
            algorithm: parse_algorithm("ES256").unwrap(),
            signing_key: SigningKey::Pem {
                private: include_bytes!("../testdata/ec256_private.pem").to_vec(),
                public: include_bytes!("../testdata/ec256_public.pem").to_vec(),
            },
            ttl: Duration::minutes(5),
            issuer: None,
            sites: vec!["example.com".to_string()],
        })
        .unwrap();

        let token = manager
            .create_token(&alice(), &CustomClaims::new(), &PTokens::default())
            .unwrap();
        let claims = manager.verify(&token).unwrap();
        assert_eq!(claims.username, "alice@example.com");
        assert_eq!(
            manager.parse_token(&token).unwrap().header.alg,
            Algorithm::ES256
        );
    }

    #[test]
    fn test_key_material_must_match_method() {
        assert!(matches!(parse_algorithm("XS256"), Err(TokenError::Key(_))));

        let mismatched = TokenConfig {
            algorithm: Algorithm::RS256,
            signing_key: SigningKey::Secret(SECRET.to_string()),
            ttl: Duration::minutes(5),
            issuer: None,
            sites: Vec::new(),
        };
        assert!(TokenManager::new(mismatched).is_err());
        assert!(TokenManager::new(TokenConfig::hmac("", Duration::minutes(5))).is_err());
    }
}
