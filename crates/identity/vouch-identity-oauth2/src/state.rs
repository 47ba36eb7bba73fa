//! Per-browser login attempt state for CSRF protection and redirect-loop guarding.

use crate::error::OAuth2Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Login attempts for one destination after which `/login` stops redirecting.
pub const MAX_LOGIN_ATTEMPTS: u32 = 2;

/// State carried between `/login` and the provider callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttemptState {
    /// The CSRF nonce sent to the provider as `state`.
    pub state: Option<String>,
    /// Where to send the browser after a successful login.
    pub requested_url: Option<String>,
    /// The `redirect_uri` used for the authorization request.
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    /// Consecutive `/login` visits per destination without a successful callback.
    #[serde(default)]
    pub failure_counts: HashMap<String, u32>,
}

impl LoginAttemptState {
    /// Record a new attempt for `requested_url` and return its attempt count.
    pub fn begin_attempt(
        &mut self,
        nonce: String,
        requested_url: &str,
        redirect_uri: String,
        code_verifier: Option<String>,
    ) -> u32 {
        self.state = Some(nonce);
        self.requested_url = Some(requested_url.to_string());
        self.redirect_uri = Some(redirect_uri);
        self.code_verifier = code_verifier;

        let count = self
            .failure_counts
            .entry(requested_url.to_string())
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Remove the stored nonce and report whether it equals `returned`.
    ///
    /// The nonce is consumed whether or not it matches, so a state value can
    /// be presented at most once.
    pub fn take_nonce_if_matches(&mut self, returned: &str) -> bool {
        match self.state.take() {
            Some(stored) => !returned.is_empty() && stored == returned,
            None => false,
        }
    }

    /// Forget the attempt after a successful login.
    pub fn complete(&mut self) {
        if let Some(url) = self.requested_url.take() {
            self.failure_counts.remove(&url);
        }
        self.state = None;
        self.redirect_uri = None;
        self.code_verifier = None;
    }

    pub fn failure_count(&self, requested_url: &str) -> u32 {
        self.failure_counts.get(requested_url).copied().unwrap_or(0)
    }
}

/// Server-side storage of [`LoginAttemptState`] keyed by an opaque session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Atomically read, modify and write the state for a session, creating it
    /// if needed. Returns the state as written.
    async fn update(
        &self,
        session_id: &str,
        apply: &mut (dyn for<'a> FnMut(&'a mut LoginAttemptState) + Send),
    ) -> OAuth2Result<LoginAttemptState>;

    /// Consume the nonce of an existing, unexpired session.
    ///
    /// Returns the session state when `returned` matched the stored nonce.
    /// Unknown session ids are never stored.
    async fn take_nonce(
        &self,
        session_id: &str,
        returned: &str,
    ) -> OAuth2Result<Option<LoginAttemptState>>;

    /// Delete a session.
    async fn remove(&self, session_id: &str) -> OAuth2Result<()>;

    /// Clean up expired sessions
    async fn cleanup_expired(&self) -> OAuth2Result<usize>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    state: LoginAttemptState,
    expires_at: DateTime<Utc>,
}

impl StoredSession {
    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// In-memory implementation of [`SessionStore`] with a sliding expiry.
pub struct InMemorySessionStore {
    sessions: DashMap<String, StoredSession>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Duration::seconds(ttl_seconds as i64),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(300)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn update(
        &self,
        session_id: &str,
        apply: &mut (dyn for<'a> FnMut(&'a mut LoginAttemptState) + Send),
    ) -> OAuth2Result<LoginAttemptState> {
        let expires_at = Utc::now() + self.ttl;
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| StoredSession {
                state: LoginAttemptState::default(),
                expires_at,
            });

        if entry.is_expired() {
            entry.state = LoginAttemptState::default();
        }
        apply(&mut entry.state);
        entry.expires_at = expires_at;

        Ok(entry.state.clone())
    }

    async fn take_nonce(
        &self,
        session_id: &str,
        returned: &str,
    ) -> OAuth2Result<Option<LoginAttemptState>> {
        let matched = match self.sessions.get_mut(session_id) {
            Some(stored) if stored.is_expired() => None,
            Some(mut stored) => Some(
                stored
                    .state
                    .take_nonce_if_matches(returned)
                    .then(|| stored.state.clone()),
            ),
            None => return Ok(None),
        };

        match matched {
            Some(state) => Ok(state),
            None => {
                self.sessions
                    .remove_if(session_id, |_, stored| stored.is_expired());
                Ok(None)
            }
        }
    }

    async fn remove(&self, session_id: &str) -> OAuth2Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> OAuth2Result<usize> {
        let before = self.sessions.len();
        self.sessions.retain(|_, stored| !stored.is_expired());
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
