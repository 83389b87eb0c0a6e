//! Fail-closed authorization gate.

use crate::authority::{AuthorityAnswer, Interaction, PolicyAuthority};
use adminfs_core::{AdminError, CallerId, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The caller may proceed
    Allowed,
    /// The caller is refused
    Denied,
}

impl Decision {
    /// Whether the caller may proceed.
    pub fn is_allowed(self) -> bool {
        self == Decision::Allowed
    }
}

/// Asks the policy authority about one fixed action on behalf of callers.
///
/// Only an explicit `Yes` allows. Every other answer and every authority
/// error deny; errors are logged and never surface as their own condition.
#[derive(Clone)]
pub struct AuthorizationGate {
    authority: Arc<dyn PolicyAuthority>,
    action_id: Arc<str>,
}

impl std::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("action_id", &self.action_id)
            .finish_non_exhaustive()
    }
}

impl AuthorizationGate {
    /// Gate for `action_id` backed by `authority`.
    pub fn new(authority: Arc<dyn PolicyAuthority>, action_id: impl Into<Arc<str>>) -> Self {
        Self {
            authority,
            action_id: action_id.into(),
        }
    }

    /// The action every check is made against.
    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    /// Check `caller`, allowing the authority to prompt.
    pub async fn check(&self, caller: &CallerId) -> Decision {
        self.check_with(caller, Interaction::AllowUserInteraction).await
    }

    async fn check_with(&self, caller: &CallerId, interaction: Interaction) -> Decision {
        match self
            .authority
            .check_authorization(&self.action_id, caller, interaction)
            .await
        {
            Ok(AuthorityAnswer::Yes) => Decision::Allowed,
            Ok(answer) => {
                debug!(caller = %caller, action = %self.action_id, ?answer, "authorization refused");
                Decision::Denied
            }
            Err(err) => {
                warn!(caller = %caller, action = %self.action_id, error = %err, "authority check failed");
                Decision::Denied
            }
        }
    }

    /// Like [`check`](Self::check), with denial as an error.
    pub async fn require(&self, caller: &CallerId) -> Result<()> {
        match self.check(caller).await {
            Decision::Allowed => Ok(()),
            Decision::Denied => Err(AdminError::access_denied(format!(
                "{caller} is not authorized for {}",
                self.action_id
            ))),
        }
    }

    /// Return once the authority stops allowing `caller`.
    ///
    /// The first check may prompt; later ones, made every `poll`, may not.
    /// Returns early with `Cancelled` when `cancelled` reports true.
    pub async fn wait_until_expired<F>(
        &self,
        caller: &CallerId,
        poll: Duration,
        cancelled: F,
    ) -> Result<()>
    where
        F: Fn() -> bool + Send + Sync,
    {
        let mut decision = self.check(caller).await;
        while decision.is_allowed() {
            if cancelled() {
                return Err(AdminError::cancelled("wait for authorization expiry cancelled"));
            }
            tokio::time::sleep(poll).await;
            decision = self.check_with(caller, Interaction::None).await;
        }
        debug!(caller = %caller, "authorization expired");
        Ok(())
    }
}
