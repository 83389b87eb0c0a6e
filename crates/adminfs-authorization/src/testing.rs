//! Scripted authority for tests.

use crate::authority::{AuthorityAnswer, AuthorityError, Interaction, PolicyAuthority};
use adminfs_core::CallerId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

type Scripted = Result<AuthorityAnswer, AuthorityError>;

#[derive(Debug, Clone)]
struct Call {
    action: String,
    subject: CallerId,
    interaction: Interaction,
}

/// Authority that replays queued answers, then a fallback, and records calls.
#[derive(Debug)]
pub struct ScriptedAuthority {
    script: Mutex<VecDeque<Scripted>>,
    fallback: AuthorityAnswer,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedAuthority {
    /// Answer `fallback` whenever the script is empty.
    pub fn always(fallback: AuthorityAnswer) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue one answer.
    pub fn push(&self, answer: AuthorityAnswer) {
        self.script.lock().push_back(Ok(answer));
    }

    /// Queue one failure.
    pub fn push_error(&self, error: AuthorityError) {
        self.script.lock().push_back(Err(error));
    }

    /// Number of checks made so far.
    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Subjects of every check, in order.
    pub fn subjects(&self) -> Vec<CallerId> {
        self.calls.lock().iter().map(|c| c.subject.clone()).collect()
    }

    /// Actions of every check, in order.
    pub fn actions(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.action.clone()).collect()
    }

    /// Interaction modes of every check, in order.
    pub fn interactions(&self) -> Vec<Interaction> {
        self.calls.lock().iter().map(|c| c.interaction).collect()
    }
}

#[async_trait]
impl PolicyAuthority for ScriptedAuthority {
    async fn check_authorization(
        &self,
        action: &str,
        subject: &CallerId,
        interaction: Interaction,
    ) -> Result<AuthorityAnswer, AuthorityError> {
        self.calls.lock().push(Call {
            action: action.to_string(),
            subject: subject.clone(),
            interaction,
        });
        let next = self.script.lock().pop_front();
        next.unwrap_or(Ok(self.fallback))
    }
}
