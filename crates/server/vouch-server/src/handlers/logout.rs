use super::redirect;
use crate::pages;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, header::SET_COOKIE};
use axum::response::{AppendHeaders, IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    url: Option<String>,
}

/// `GET /logout`: forget the proof token and any login attempt in progress.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LogoutQuery>,
) -> Response {
    debug!("/logout");

    if let Some(session_id) = state.session_cookie.read(&headers) {
        debug!("deleting session");
        if let Err(e) = state.sessions.remove(&session_id).await {
            error!("Failed to delete session: {}", e);
        }
    }

    let cookies = AppendHeaders([
        (SET_COOKIE, state.proof_cookie.clear()),
        (SET_COOKIE, state.session_cookie.clear()),
    ]);

    match query.url.filter(|url| !url.is_empty()) {
        Some(url) => (cookies, redirect(&state, &url)).into_response(),
        None => (cookies, pages::message("/logout you have been logged out")).into_response(),
    }
}
