//! The policy authority contract and its static implementation.

use adminfs_core::{AuthorityConfig, CallerId, DefaultPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Answer of a policy authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityAnswer {
    /// The subject may perform the action
    Yes,
    /// The subject may not perform the action
    No,
    /// The subject could be allowed after authenticating
    Challenge,
    /// The authority could not decide
    Unknown,
}

/// Failure to obtain an answer at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorityError {
    /// The authority could not be reached
    #[error("Authority unavailable: {message}")]
    Unavailable {
        /// Error message
        message: String,
    },
    /// The authority replied with something unintelligible
    #[error("Malformed authority reply: {message}")]
    Malformed {
        /// Error message
        message: String,
    },
}

impl AuthorityError {
    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a malformed-reply error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Whether the authority may interact with the user to reach a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interaction {
    /// Answer from cached state only
    None,
    /// The authority may prompt the user
    AllowUserInteraction,
}

/// External oracle answering "may `subject` perform `action`?".
#[async_trait]
pub trait PolicyAuthority: Send + Sync {
    /// Ask the authority about one action.
    async fn check_authorization(
        &self,
        action: &str,
        subject: &CallerId,
        interaction: Interaction,
    ) -> Result<AuthorityAnswer, AuthorityError>;
}

/// Authority answering from the `authority` configuration table.
///
/// An explicit deny beats an explicit allow, which beats the default.
#[derive(Debug, Clone)]
pub struct StaticAuthority {
    default: DefaultPolicy,
    allow: HashSet<CallerId>,
    deny: HashSet<CallerId>,
}

impl StaticAuthority {
    /// Build from configuration.
    pub fn from_config(config: &AuthorityConfig) -> Self {
        Self {
            default: config.default,
            allow: config.allow.iter().cloned().collect(),
            deny: config.deny.iter().cloned().collect(),
        }
    }

    /// Authority that answers `Yes` to everyone not denied.
    pub fn allow_all() -> Self {
        Self::from_config(&AuthorityConfig {
            default: DefaultPolicy::Allow,
            ..AuthorityConfig::default()
        })
    }

    fn answer_for(&self, subject: &CallerId) -> AuthorityAnswer {
        if self.deny.contains(subject) {
            return AuthorityAnswer::No;
        }
        if self.allow.contains(subject) {
            return AuthorityAnswer::Yes;
        }
        match self.default {
            DefaultPolicy::Allow => AuthorityAnswer::Yes,
            DefaultPolicy::Deny => AuthorityAnswer::No,
        }
    }
}

#[async_trait]
impl PolicyAuthority for StaticAuthority {
    async fn check_authorization(
        &self,
        _action: &str,
        subject: &CallerId,
        _interaction: Interaction,
    ) -> Result<AuthorityAnswer, AuthorityError> {
        Ok(self.answer_for(subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deny_beats_allow_beats_default() {
        let authority = StaticAuthority::from_config(&AuthorityConfig {
            default: DefaultPolicy::Deny,
            allow: vec!["alice".into(), "mallory".into()],
            deny: vec!["mallory".into()],
        });

        let ask = |name: &str| {
            let subject = CallerId::new(name);
            let authority = authority.clone();
            async move {
                authority
                    .check_authorization("org.adminfs.commands", &subject, Interaction::None)
                    .await
                    .unwrap()
            }
        };

        assert_eq!(ask("alice").await, AuthorityAnswer::Yes);
        assert_eq!(ask("mallory").await, AuthorityAnswer::No);
        assert_eq!(ask("bob").await, AuthorityAnswer::No);
    }

    #[tokio::test]
    async fn allow_all_still_honors_nobody_denied() {
        let authority = StaticAuthority::allow_all();
        let answer = authority
            .check_authorization("x", &CallerId::new("anyone"), Interaction::AllowUserInteraction)
            .await
            .unwrap();
        assert_eq!(answer, AuthorityAnswer::Yes);
    }
}
