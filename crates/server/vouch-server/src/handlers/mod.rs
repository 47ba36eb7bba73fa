//! HTTP handlers for the vouch endpoints.

mod health;
mod login;
mod logout;
mod validate;

pub use health::healthcheck;
pub use login::{callback, login};
pub use logout::logout;
pub use validate::validate;

use crate::pages;
use crate::state::AppState;
use axum::http::{StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};

/// Body of a successful `/validate`.
pub(crate) const OK_BODY: &str = "200 OK\n";

/// 302 to `url`, or in testing mode a page naming it.
pub(crate) fn redirect(state: &AppState, url: &str) -> Response {
    if state.config.vouch.testing {
        tracing::debug!(url = %url, "Testing mode, rendering redirect");
        return pages::redirect(url).into_response();
    }
    (StatusCode::FOUND, [(LOCATION, url.to_string())]).into_response()
}
