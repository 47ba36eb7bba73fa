//! Vouch: an authorization edge service for reverse proxies.
//!
//! The proxy asks `/validate` about every inbound request. Browsers without a
//! valid proof token are sent through `/login`, authenticate with the
//! configured OAuth2/OIDC provider, and come back via `/auth` with a signed
//! token scoped to the managed sites.

pub mod config;
pub mod cookie;
pub mod domains;
pub mod error;
pub mod handlers;
pub mod pages;
pub mod policy;
pub mod state;
pub mod telemetry;

pub use config::Config;
pub use error::{Result, ServerError};
pub use state::AppState;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};
use vouch_identity_oauth2::SessionStore;

/// Build the router with every vouch endpoint.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/login", get(handlers::login))
        .route("/auth", get(handlers::callback))
        .route("/logout", get(handlers::logout))
        .route(
            "/validate",
            get(handlers::validate).post(handlers::validate),
        )
        .route("/healthcheck", get(handlers::healthcheck))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically drop expired login-attempt sessions.
pub fn spawn_session_cleanup(
    sessions: Arc<dyn SessionStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sessions.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Cleaned up expired sessions"),
                Err(e) => error!("Session cleanup failed: {}", e),
            }
        }
    })
}
