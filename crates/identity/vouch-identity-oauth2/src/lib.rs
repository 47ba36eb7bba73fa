//! OAuth2/OIDC identity provider implementation with PKCE support.
//!
//! This crate provides the provider adapters used by the vouch edge service
//! (generic OIDC, Google and GitHub), the CSRF state nonce generator, and the
//! server-side login-attempt sessions that guard against redirect loops.

mod client;
mod config;
mod error;
mod nonce;
mod provider;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use client::{OAuth2Client, PkceChallenge};
pub use config::{OAuth2ProviderConfig, UserInfoMapping};
pub use error::{OAuth2Error, OAuth2Result};
pub use nonce::{NONCE_ENTROPY_BYTES, generate_state_nonce};
pub use provider::OAuth2Provider;
pub use state::{InMemorySessionStore, LoginAttemptState, MAX_LOGIN_ATTEMPTS, SessionStore};
pub use types::TokenResponse;

// Re-export common types for convenience
pub use vouch_identity_core::{Provider, ProviderIdentity};
