//! Entry point of the helper: authorizes creation and routes calls.

use crate::command::CommandObject;
use crate::events::EventStream;
use crate::jobs;
use crate::registry::CommandRegistry;
use adminfs_authorization::{AuthorizationGate, Decision};
use adminfs_core::{
    AdminConfig, AdminError, CallerId, CommandAddress, ControlCall, ControlReply, Request, Result,
};
use adminfs_stream::PipeEndpoint;
use std::sync::Arc;
use tracing::{info, warn};

/// Creates command objects for authorized callers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    gate: AuthorizationGate,
    registry: Arc<CommandRegistry>,
    config: Arc<AdminConfig>,
}

impl Dispatcher {
    /// Dispatcher checking every caller against `gate`.
    pub fn new(gate: AuthorizationGate, config: Arc<AdminConfig>) -> Self {
        Self {
            gate,
            registry: Arc::new(CommandRegistry::new()),
            config,
        }
    }

    /// Live commands.
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Authorize `request` and register a command object for it.
    ///
    /// A denied caller gets `AccessDenied` and nothing is registered.
    pub async fn create(
        &self,
        request: Request,
        endpoint: Option<PipeEndpoint>,
    ) -> Result<CommandAddress> {
        let Request { caller, command } = request;
        let verb = command.verb();
        if self.gate.check(&caller).await == Decision::Denied {
            warn!(caller = %caller, verb = %verb, "command creation denied");
            return Err(AdminError::access_denied(format!(
                "{caller} may not {verb} {}",
                command.url()
            )));
        }
        command.validate()?;

        let target = command.url().to_file_url();
        let body = jobs::build(command, endpoint)?;
        let address = self.registry.allocate(verb)?;
        let object = CommandObject::new(
            address,
            caller.clone(),
            self.gate.clone(),
            body,
            self.config.clone(),
            Arc::downgrade(&self.registry),
        );
        self.registry.register(Arc::new(object));
        info!(address = %address, caller = %caller, target = %target, "command created");
        Ok(address)
    }

    fn lookup(&self, address: &CommandAddress) -> Result<Arc<CommandObject>> {
        self.registry
            .get(address)
            .ok_or_else(|| AdminError::transport(format!("no command at {address}")))
    }

    /// Take the event stream of the command at `address`.
    pub fn subscribe(&self, caller: &CallerId, address: &CommandAddress) -> Result<EventStream> {
        self.lookup(address)?.subscribe(caller)
    }

    /// Apply a control call to the command at `address`.
    pub async fn control(
        &self,
        caller: &CallerId,
        address: &CommandAddress,
        call: ControlCall,
    ) -> Result<ControlReply> {
        self.lookup(address)?.control(caller, call).await
    }
}
