//! `/validate`: the per-request check behind the proxy's `auth_request`.

use super::OK_BODY;
use crate::error::ServerError;
use crate::pages;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, HOST};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use tracing::{debug, error, warn};
use vouch_auth_core::{AuthError, AuthResult};
use vouch_identity_session::VouchClaims;

/// `GET|POST /validate`
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    match authenticate(&state, &headers, &query, host) {
        Ok((claims, user)) => authorized(&state, &claims, user),
        Err(error) if !error.is_authentication_failure() => {
            ServerError::from(error).into_response()
        }
        Err(error) if state.config.vouch.public_access => {
            debug!(error = %error, "Not authenticated, public access is enabled");
            let mut response = OK_BODY.into_response();
            response
                .headers_mut()
                .insert(state.headers.user.clone(), HeaderValue::from_static(""));
            response
        }
        Err(error) => ServerError::Unauthorized {
            error,
            clear_cookie: state.proof_cookie.clear(),
        }
        .into_response(),
    }
}

fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    host: &str,
) -> AuthResult<(VouchClaims, HeaderValue)> {
    let token = find_jwt(state, headers, query).ok_or(AuthError::NoTokenPresent)?;
    let claims = state.tokens.verify(&token)?;
    debug!(username = %claims.username, "jwt verified");

    if !state.config.vouch.allow_all_users && !state.tokens.site_authorized(host, &claims) {
        return Err(AuthError::SiteNotAuthorized {
            host: host.to_string(),
        });
    }

    let user = HeaderValue::from_bytes(claims.username.as_bytes()).map_err(|_| {
        AuthError::MalformedClaims("username is not a valid header value".to_string())
    })?;

    Ok((claims, user))
}

/// Look for the token in the cookie, the JWT header, an `Authorization:
/// Bearer` header and the query string, in that order.
fn find_jwt(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Option<String> {
    if let Some(token) = state.proof_cookie.read(headers) {
        debug!("jwt from cookie");
        return Some(token);
    }

    if let Some(token) = header_str(headers, &state.headers.jwt) {
        debug!(header = %state.headers.jwt, "jwt from header");
        return Some(token.to_string());
    }

    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
    {
        debug!("jwt from authorization header");
        return Some(token.to_string());
    }

    let param = &state.config.headers.querystring;
    if let Some(token) = query.get(param).filter(|t| !t.is_empty()) {
        debug!(param = %param, "jwt from querystring");
        return Some(token.clone());
    }

    None
}

fn header_str<'a>(headers: &'a HeaderMap, name: &axum::http::HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn bearer_token(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    parts.next().filter(|token| !token.is_empty())
}

fn authorized(state: &AppState, claims: &VouchClaims, user: HeaderValue) -> Response {
    let mut response = if state.config.vouch.testing {
        pages::message(&format!("user authorized {}", claims.username)).into_response()
    } else {
        OK_BODY.into_response()
    };

    let headers = response.headers_mut();
    for (claim, header) in &state.headers.claims {
        let Some(value) = claims.custom_claims.get(claim) else {
            continue;
        };
        match value.header_value() {
            Some(rendered) => match HeaderValue::from_bytes(rendered.as_bytes()) {
                Ok(rendered) => {
                    debug!(claim = %claim, header = %header, "Adding claim header");
                    headers.append(header.clone(), rendered);
                }
                Err(_) => warn!(claim = %claim, "Claim value is not a valid header value, skipping"),
            },
            None => {
                let error = AuthError::ConfigurationError(format!(
                    "couldn't render claim {} as a header value: {:?}",
                    claim, value
                ));
                error!(error = %error, "Skipping claim header");
            }
        }
    }

    headers.insert(state.headers.user.clone(), user);
    headers.insert(state.headers.success.clone(), HeaderValue::from_static("true"));

    if let Some(name) = &state.headers.access_token {
        insert_token(headers, name, &claims.p_access_token);
    }
    if let Some(name) = &state.headers.id_token {
        insert_token(headers, name, &claims.p_id_token);
    }

    response
}

fn insert_token(headers: &mut HeaderMap, name: &axum::http::HeaderName, token: &str) {
    if token.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(token) {
        headers.insert(name.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer   xyz"), Some("xyz"));
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token(""), None);
    }
}
