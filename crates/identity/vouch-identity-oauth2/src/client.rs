//! OAuth2 client implementation with PKCE support.

use crate::config::OAuth2ProviderConfig;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::TokenResponse;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, thread_rng};
use reqwest::Client;
use reqwest::header::ACCEPT;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// PKCE code challenge and verifier
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    /// Generate a new PKCE challenge
    pub fn new() -> Self {
        let code_verifier = Self::generate_code_verifier();
        let code_challenge = Self::challenge_for(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }

    fn generate_code_verifier() -> String {
        let mut rng = thread_rng();
        let bytes: Vec<u8> = (0..64).map(|_| rng.r#gen::<u8>()).collect();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// The S256 challenge for a verifier.
    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

/// HTTP client for the provider's authorization, token and userinfo endpoints
#[derive(Clone)]
pub struct OAuth2Client {
    http_client: Client,
}

impl OAuth2Client {
    pub fn new(http_timeout_seconds: u64) -> OAuth2Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(http_timeout_seconds))
            .user_agent(concat!("vouch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OAuth2Error::ConfigError(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { http_client })
    }

    /// Generate the authorization URL the browser is sent to
    pub fn authorization_url(
        &self,
        provider_config: &OAuth2ProviderConfig,
        state: &str,
        redirect_uri: &str,
        code_challenge: Option<&str>,
    ) -> OAuth2Result<String> {
        let mut url = Url::parse(&provider_config.authorization_endpoint)?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &provider_config.client_id);
            params.append_pair("redirect_uri", redirect_uri);
            params.append_pair("state", state);

            if !provider_config.scopes.is_empty() {
                params.append_pair("scope", &provider_config.scopes.join(" "));
            }

            if let Some(challenge) = code_challenge {
                params.append_pair("code_challenge", challenge);
                params.append_pair("code_challenge_method", "S256");
            }

            for (key, value) in &provider_config.auth_params {
                params.append_pair(key, value);
            }
        }

        debug!(
            "Generated authorization URL for provider {}",
            provider_config.provider_id
        );
        Ok(url.to_string())
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(
        &self,
        provider_config: &OAuth2ProviderConfig,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> OAuth2Result<TokenResponse> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", provider_config.client_id.as_str()),
            ("client_secret", provider_config.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];

        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let response = self
            .http_client
            .post(&provider_config.token_endpoint)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Token exchange failed: {}", error_text);
            return Err(OAuth2Error::TokenExchangeFailed(error_text));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                OAuth2Error::Timeout
            } else {
                OAuth2Error::InvalidTokenResponse(e.to_string())
            }
        })?;

        debug!("Exchanged authorization code for tokens");
        Ok(token_response)
    }

    /// Fetch the raw userinfo document using the access token
    pub async fn get_user_info(
        &self,
        provider_config: &OAuth2ProviderConfig,
        access_token: &str,
    ) -> OAuth2Result<serde_json::Value> {
        let userinfo_endpoint = provider_config.userinfo_endpoint.as_ref().ok_or_else(|| {
            OAuth2Error::ConfigError("User info endpoint not configured".to_string())
        })?;

        let response = self
            .http_client
            .get(userinfo_endpoint)
            .header(ACCEPT, "application/json")
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("User info request failed: {}", error_text);
            return Err(OAuth2Error::UserInfoFailed(error_text));
        }

        let user_info: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                OAuth2Error::Timeout
            } else {
                OAuth2Error::InvalidUserInfoResponse(e.to_string())
            }
        })?;

        if !user_info.is_object() {
            return Err(OAuth2Error::InvalidUserInfoResponse(
                "user info is not a JSON object".to_string(),
            ));
        }

        Ok(user_info)
    }
}
