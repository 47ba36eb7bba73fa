//! OAuth2 error types.

use thiserror::Error;
use vouch_identity_core::IdentityError;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("HTTP request failed: {0}")]
    HttpError(#[source] reqwest::Error),

    #[error("Request to provider timed out")]
    Timeout,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Could not obtain secure randomness: {0}")]
    Randomness(String),

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("User info request failed: {0}")]
    UserInfoFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Invalid user info response: {0}")]
    InvalidUserInfoResponse(String),
}

impl From<reqwest::Error> for OAuth2Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OAuth2Error::Timeout
        } else {
            OAuth2Error::HttpError(err)
        }
    }
}

impl From<OAuth2Error> for IdentityError {
    fn from(err: OAuth2Error) -> Self {
        match err {
            OAuth2Error::Timeout => IdentityError::Timeout,
            OAuth2Error::ConfigError(msg) => IdentityError::Configuration(msg),
            OAuth2Error::UrlError(e) => IdentityError::Configuration(e.to_string()),
            OAuth2Error::InvalidUserInfoResponse(msg) => IdentityError::InvalidUserInfo(msg),
            OAuth2Error::SerializationError(e) => IdentityError::SerializationError(e),
            other => IdentityError::ProviderError(other.to_string()),
        }
    }
}
