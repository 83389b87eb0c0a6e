//! Per-verb command objects.

use crate::events::{event_channel, EventEmitter, EventStream};
use crate::job::{CommandState, JobContext, KillSwitch, Lifecycle};
use crate::registry::CommandRegistry;
use adminfs_authorization::AuthorizationGate;
use adminfs_core::{
    AdminConfig, AdminError, CallerId, CommandAddress, CommandResult, ControlCall, ControlReply,
    ErrorCode, Result, Verb,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Verb-specific body of a command object.
#[async_trait]
pub trait VerbCommand: Send + Sync {
    /// Verb implemented by this body.
    fn verb(&self) -> Verb;

    /// Begin the privileged job. Must not block.
    fn start(&self, ctx: JobContext) -> Result<()>;

    /// Handle a verb-specific control call on a running command.
    async fn control(&self, call: ControlCall) -> Result<ControlReply> {
        Err(AdminError::invalid(format!(
            "{} does not accept {}",
            self.verb(),
            call.name()
        )))
    }

    /// Forward a kill request to the job.
    fn kill(&self, switch: &KillSwitch) {
        switch.kill();
    }
}

/// A live command registered at an address.
///
/// Owned by its creator: only that caller may subscribe to it or control it,
/// and every control call is authorized again first.
pub struct CommandObject {
    address: CommandAddress,
    owner: CallerId,
    gate: AuthorizationGate,
    body: Box<dyn VerbCommand>,
    lifecycle: Arc<Lifecycle>,
    emitter: EventEmitter,
    events: Mutex<Option<EventStream>>,
    kill: KillSwitch,
    config: Arc<AdminConfig>,
}

impl std::fmt::Debug for CommandObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandObject")
            .field("address", &self.address)
            .field("owner", &self.owner)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl CommandObject {
    pub(crate) fn new(
        address: CommandAddress,
        owner: CallerId,
        gate: AuthorizationGate,
        body: Box<dyn VerbCommand>,
        config: Arc<AdminConfig>,
        registry: Weak<CommandRegistry>,
    ) -> Self {
        let (emitter, events) = event_channel();
        Self {
            address,
            owner,
            gate,
            body,
            lifecycle: Arc::new(Lifecycle::new(address, emitter.clone(), registry)),
            emitter,
            events: Mutex::new(Some(events)),
            kill: KillSwitch::new(),
            config,
        }
    }

    /// Registry address.
    pub fn address(&self) -> CommandAddress {
        self.address
    }

    /// Verb of the command.
    pub fn verb(&self) -> Verb {
        self.body.verb()
    }

    /// Caller that created the command.
    pub fn owner(&self) -> &CallerId {
        &self.owner
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CommandState {
        self.lifecycle.state()
    }

    fn ensure_owner(&self, caller: &CallerId) -> Result<()> {
        if caller == &self.owner {
            Ok(())
        } else {
            Err(AdminError::access_denied(format!(
                "{caller} does not own {}",
                self.address
            )))
        }
    }

    /// Take the event stream. Only the owner can, and only once.
    pub fn subscribe(&self, caller: &CallerId) -> Result<EventStream> {
        self.ensure_owner(caller)?;
        self.events.lock().take().ok_or_else(|| {
            AdminError::access_denied(format!("{} already has a subscriber", self.address))
        })
    }

    /// Authorize and apply one control call.
    ///
    /// An owner refused `start` on an unstarted command retires it: no
    /// later call could run it, so it finishes and leaves the registry.
    pub async fn control(&self, caller: &CallerId, call: ControlCall) -> Result<ControlReply> {
        if let Err(err) = self.gate.require(caller).await {
            let retire = matches!(call, ControlCall::Start)
                && caller == &self.owner
                && self.state() == CommandState::Created;
            if retire {
                info!(address = %self.address, "start denied, retiring command");
                self.lifecycle.finish(CommandResult::from_error(&err));
            }
            return Err(err);
        }
        self.ensure_owner(caller)?;
        debug!(address = %self.address, call = call.name(), "control call");

        match call {
            ControlCall::Start => self.start(),
            ControlCall::Kill => self.kill(),
            call => {
                if self.state() != CommandState::Running {
                    return Err(AdminError::invalid(format!(
                        "{} is not running",
                        self.address
                    )));
                }
                self.body.control(call).await
            }
        }
    }

    fn start(&self) -> Result<ControlReply> {
        self.lifecycle.transition(CommandState::Running)?;
        info!(address = %self.address, caller = %self.owner, "command started");
        let ctx = JobContext {
            address: self.address,
            events: self.emitter.clone(),
            kill: self.kill.signal(),
            config: self.config.clone(),
            lifecycle: self.lifecycle.clone(),
        };
        if let Err(err) = self.body.start(ctx) {
            self.lifecycle.finish(CommandResult::from_error(&err));
            return Err(err);
        }
        Ok(ControlReply::Done)
    }

    fn kill(&self) -> Result<ControlReply> {
        if !self.verb().is_killable() {
            return Err(AdminError::invalid(format!(
                "{} cannot be killed",
                self.verb()
            )));
        }
        match self.state() {
            CommandState::Created => {
                self.kill.kill();
                self.lifecycle.finish(CommandResult::failure(
                    ErrorCode::Cancelled,
                    "killed before start",
                ));
            }
            CommandState::Running => {
                info!(address = %self.address, "kill requested");
                self.body.kill(&self.kill);
            }
            // Already finished; the terminal event was delivered.
            _ => {}
        }
        Ok(ControlReply::Done)
    }
}
