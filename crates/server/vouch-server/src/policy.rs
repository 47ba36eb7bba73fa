//! Authorization policy: may this authenticated user proceed?

use crate::config::VouchConfig;
use crate::domains::Domains;
use tracing::{debug, warn};
use vouch_auth_core::{AuthError, AuthResult};
use vouch_identity_core::User;

/// Which rule decided, in precedence order. Exactly one applies to any
/// given configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyTier {
    AllowAll,
    Whitelist,
    TeamWhitelist,
    Domains,
    /// Nothing configured: any successful upstream login is enough.
    DefaultOpen,
}

impl PolicyTier {
    pub fn select(config: &VouchConfig) -> Self {
        if config.allow_all_users {
            PolicyTier::AllowAll
        } else if !config.whitelist.is_empty() {
            PolicyTier::Whitelist
        } else if !config.team_whitelist.is_empty() {
            PolicyTier::TeamWhitelist
        } else if !config.domains.is_empty() {
            PolicyTier::Domains
        } else {
            PolicyTier::DefaultOpen
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub tier: PolicyTier,
    /// Why the user was denied, `None` when permitted.
    pub denial: Option<String>,
}

impl AuthorizationDecision {
    fn permit(tier: PolicyTier) -> Self {
        Self { tier, denial: None }
    }

    fn deny(tier: PolicyTier, reason: String) -> Self {
        Self {
            tier,
            denial: Some(reason),
        }
    }

    pub fn into_result(self) -> AuthResult<()> {
        match self.denial {
            None => Ok(()),
            Some(reason) => Err(AuthError::PolicyDenied(reason)),
        }
    }
}

pub fn verify_user(user: &User, config: &VouchConfig, domains: &Domains) -> AuthorizationDecision {
    let tier = PolicyTier::select(config);

    match tier {
        PolicyTier::AllowAll => {
            debug!(username = %user.username, "allow_all_users is set, skipping verification");
            AuthorizationDecision::permit(tier)
        }
        PolicyTier::Whitelist => {
            if config.whitelist.iter().any(|wl| *wl == user.username) {
                debug!(username = %user.username, "Found username in whitelist");
                AuthorizationDecision::permit(tier)
            } else {
                AuthorizationDecision::deny(
                    tier,
                    format!("user.Username not found in WhiteList: {}", user.username),
                )
            }
        }
        PolicyTier::TeamWhitelist => {
            match user
                .team_memberships
                .iter()
                .find(|team| config.team_whitelist.contains(team))
            {
                Some(team) => {
                    debug!(username = %user.username, team = %team, "Found team in team whitelist");
                    AuthorizationDecision::permit(tier)
                }
                None => AuthorizationDecision::deny(
                    tier,
                    format!(
                        "user.TeamMemberships {:?} not found in TeamWhiteList: {:?} for user {}",
                        user.team_memberships, config.team_whitelist, user.username
                    ),
                ),
            }
        }
        PolicyTier::Domains => {
            let email = user.email.as_deref().unwrap_or_default();
            if domains.is_under_management(email) {
                debug!(email = %email, "Email is within a managed domain");
                AuthorizationDecision::permit(tier)
            } else {
                AuthorizationDecision::deny(
                    tier,
                    format!("Email {} is not within a managed domain", email),
                )
            }
        }
        PolicyTier::DefaultOpen => {
            warn!(
                username = %user.username,
                "no domains, whitelist, team_whitelist or allow_all_users configured, any successful auth to the IdP authorizes access"
            );
            AuthorizationDecision::permit(tier)
        }
    }
}
