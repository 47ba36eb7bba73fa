//! The OAuth2 login flow: `/login` sends the browser to the provider, `/auth`
//! receives it back and issues the proof token.

use super::redirect;
use crate::error::{Result, ServerError};
use crate::pages;
use crate::policy::verify_user;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, header::HOST, header::SET_COOKIE};
use axum::response::{AppendHeaders, IntoResponse, Response};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use vouch_auth_core::AuthError;
use vouch_identity_core::CallbackRequest;
use vouch_identity_oauth2::{
    LoginAttemptState, MAX_LOGIN_ATTEMPTS, OAuth2Error, PkceChallenge, generate_state_nonce,
};

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    url: Option<String>,
    error: Option<String>,
}

fn internal(e: OAuth2Error) -> ServerError {
    ServerError::Internal(e.to_string())
}

/// The callback URL to hand the provider for a request to `host`.
fn callback_url(state: &AppState, host: &str) -> String {
    let urls = &state.config.oauth.callback_urls;
    state
        .domains
        .matches(host)
        .and_then(|domain| urls.iter().find(|url| url.contains(domain)))
        .or_else(|| urls.first())
        .cloned()
        .unwrap_or_default()
}

/// `GET /login?url=<destination>`
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Result<Response> {
    debug!("/login");

    // whatever brought the browser here, a stale token must not survive
    let clear_proof = state.proof_cookie.clear();

    let Some(requested_url) = query.url.filter(|url| !url.is_empty()) else {
        error!("no destination URL requested");
        return Ok((
            AppendHeaders([(SET_COOKIE, clear_proof)]),
            pages::message("/login no destination URL requested"),
        )
            .into_response());
    };

    let nonce = generate_state_nonce().map_err(internal)?;
    let session_id = match state.session_cookie.read(&headers) {
        Some(id) => id,
        None => generate_state_nonce().map_err(internal)?,
    };

    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    let redirect_uri = callback_url(&state, host);
    let pkce = state.provider.uses_pkce().then(PkceChallenge::new);
    let code_verifier = pkce.as_ref().map(|p| p.code_verifier.clone());

    let attempt = state
        .sessions
        .update(&session_id, &mut |attempt: &mut LoginAttemptState| {
            attempt.begin_attempt(
                nonce.clone(),
                &requested_url,
                redirect_uri.clone(),
                code_verifier.clone(),
            );
        })
        .await
        .map_err(internal)?;
    let attempts = attempt.failure_count(&requested_url);
    debug!(url = %requested_url, attempts, "Recorded login attempt");

    let cookies = AppendHeaders([
        (SET_COOKIE, clear_proof),
        (SET_COOKIE, state.session_cookie.set(&session_id)),
    ]);

    if attempts > MAX_LOGIN_ATTEMPTS {
        let vouch_error = query.error.unwrap_or_default();
        warn!(url = %requested_url, attempts, "Too many login redirects");
        return Ok((
            cookies,
            pages::message(&format!(
                "/login too many redirects for {} - {}",
                requested_url, vouch_error
            )),
        )
            .into_response());
    }

    let auth_url = state
        .provider
        .authorization_url(
            &nonce,
            &redirect_uri,
            pkce.as_ref().map(|p| p.code_challenge.as_str()),
        )
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    debug!(redirect_uri = %redirect_uri, "Redirecting to provider");

    Ok((cookies, redirect(&state, &auth_url)).into_response())
}

/// `GET /auth`: the provider's callback.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    debug!("/auth");

    if let Some(error) = params.get("error").filter(|e| !e.is_empty()) {
        let description = params
            .get("error_description")
            .cloned()
            .unwrap_or_default();
        warn!(error = %error, description = %description, "/auth error from provider");
        return Err(ServerError::Forbidden(description));
    }

    let returned_state = params.get("state").cloned().unwrap_or_default();
    let session_id = state
        .session_cookie
        .read(&headers)
        .ok_or(AuthError::StateNonceMismatch)?;

    let Some(attempt) = state
        .sessions
        .take_nonce(&session_id, &returned_state)
        .await
        .map_err(internal)?
    else {
        warn!(returned = %returned_state, "/auth Invalid session state");
        return Err(AuthError::StateNonceMismatch.into());
    };

    let code = params
        .get("code")
        .cloned()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AuthError::ProviderError("no authorization code returned".to_string()))?;

    let request = CallbackRequest {
        code,
        redirect_uri: attempt
            .redirect_uri
            .clone()
            .unwrap_or_else(|| callback_url(&state, "")),
        code_verifier: attempt.code_verifier.clone(),
        query: params,
    };

    let identity = state
        .provider
        .get_user_info(&request)
        .await
        .map_err(|e| AuthError::ProviderError(e.to_string()))?;
    debug!(username = %identity.user.username, "/auth user info retrieved");

    let requested_url = attempt.requested_url.clone().unwrap_or_default();

    if let Err(denied) =
        verify_user(&identity.user, &state.config.vouch, &state.domains).into_result()
    {
        if requested_url.is_empty() {
            return Err(denied.into());
        }
        error!(username = %identity.user.username, reason = %denied, "User is not authorized");
        return Ok(pages::message_with_link(
            &format!("/auth User is not authorized. {}", denied),
            &requested_url,
            "Please try again",
        )
        .into_response());
    }

    let token = state
        .tokens
        .create_token(&identity.user, &identity.custom_claims, &identity.tokens)
        .map_err(AuthError::from)?;
    info!(username = %identity.user.username, "Issued proof token");

    if let Err(e) = state
        .sessions
        .update(&session_id, &mut |attempt: &mut LoginAttemptState| attempt.complete())
        .await
    {
        error!("Failed to clear login attempt: {}", e);
    }

    let cookie = AppendHeaders([(SET_COOKIE, state.proof_cookie.set(&token))]);

    if requested_url.is_empty() {
        return Ok((cookie, pages::message(&format!("/auth {}", token))).into_response());
    }
    Ok((cookie, redirect(&state, &requested_url)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use std::sync::Arc;
    use vouch_identity_core::{IdentityResult, Provider, ProviderIdentity};

    struct NoopProvider;

    #[async_trait]
    impl Provider for NoopProvider {
        fn provider_id(&self) -> &str {
            "noop"
        }

        fn configure(&self) -> IdentityResult<()> {
            Ok(())
        }

        fn authorization_url(
            &self,
            _state: &str,
            _redirect_uri: &str,
            _code_challenge: Option<&str>,
        ) -> IdentityResult<String> {
            Ok("https://idp.test/auth".to_string())
        }

        async fn get_user_info(&self, _: &CallbackRequest) -> IdentityResult<ProviderIdentity> {
            Ok(ProviderIdentity::default())
        }
    }

    fn state_with_callbacks(domains: &[&str], callbacks: &[&str]) -> AppState {
        let mut config = Config::default();
        config.jwt.secret = "0123456789abcdef0123456789abcdef".to_string();
        config.vouch.domains = domains.iter().map(|d| d.to_string()).collect();
        config.oauth.callback_urls = callbacks.iter().map(|c| c.to_string()).collect();
        AppState::new(config, Arc::new(NoopProvider)).unwrap()
    }

    #[test]
    fn test_callback_url_follows_request_domain() {
        let state = state_with_callbacks(
            &["example.com", "example.org"],
            &[
                "https://vouch.example.com/auth",
                "https://vouch.example.org/auth",
            ],
        );

        assert_eq!(
            callback_url(&state, "app.example.org"),
            "https://vouch.example.org/auth"
        );
        assert_eq!(
            callback_url(&state, "app.example.com:8443"),
            "https://vouch.example.com/auth"
        );
        assert_eq!(
            callback_url(&state, "unrelated.net"),
            "https://vouch.example.com/auth"
        );
    }
}
