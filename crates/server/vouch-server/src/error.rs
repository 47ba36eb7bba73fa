//! Error types for the HTTP handlers.

use crate::pages;
use axum::{
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Response},
};
use thiserror::Error;
use vouch_auth_core::AuthError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// `/validate` rejected the request. Carries the `Set-Cookie` value that
    /// clears the proof cookie.
    #[error("{error}")]
    Unauthorized {
        error: AuthError,
        clear_cookie: String,
    },

    /// The provider sent the browser back with an `error` parameter.
    #[error("FORBIDDEN: {0}")]
    Forbidden(String),

    /// The login flow stopped short of issuing a token.
    #[error("{0}")]
    Login(AuthError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for ServerError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Internal(msg) => ServerError::Internal(msg),
            error if error.is_login_failure() => ServerError::Login(error),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = self.to_string();

        match self {
            ServerError::Unauthorized { error, clear_cookie } => {
                tracing::warn!(error = %error, "Request not authorized");
                (
                    StatusCode::UNAUTHORIZED,
                    AppendHeaders([(SET_COOKIE, clear_cookie)]),
                    message,
                )
                    .into_response()
            }
            ServerError::Forbidden(_) => {
                tracing::warn!(error = %message, "Provider returned an error");
                (StatusCode::FORBIDDEN, pages::message(&message)).into_response()
            }
            ServerError::Login(AuthError::StateNonceMismatch) => {
                tracing::warn!("Callback state does not match the login attempt");
                pages::message(&format!("/auth {}", message)).into_response()
            }
            ServerError::Login(AuthError::PolicyDenied(_)) => {
                tracing::error!(error = %message, "User is not authorized");
                pages::message(&format!(
                    "/auth User is not authorized. {} Please try again.",
                    message
                ))
                .into_response()
            }
            ServerError::Login(error) => {
                tracing::error!(error = %error, "Login failed");
                (StatusCode::BAD_REQUEST, message).into_response()
            }
            ServerError::Internal(_) => {
                tracing::error!(error = %message, "Server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}
