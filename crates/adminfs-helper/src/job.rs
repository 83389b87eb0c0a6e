//! Running a command's privileged job and delivering its one terminal result.

use crate::events::EventEmitter;
use crate::registry::CommandRegistry;
use adminfs_core::{
    AdminConfig, AdminError, CommandAddress, CommandEvent, CommandResult, ErrorCode, Result,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle state of a command object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Registered, not started
    Created,
    /// The job is running
    Running,
    /// The job succeeded
    Completed,
    /// The job failed
    Failed,
    /// The job was killed
    Cancelled,
}

impl CommandState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandState::Completed | CommandState::Failed | CommandState::Cancelled
        )
    }

    fn can_become(self, next: CommandState) -> bool {
        match (self, next) {
            (CommandState::Created, CommandState::Running) => true,
            // Killed or failed before the job ever ran.
            (CommandState::Created, CommandState::Cancelled | CommandState::Failed) => true,
            (CommandState::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    fn for_result(result: &CommandResult) -> CommandState {
        match result.code {
            ErrorCode::NoError => CommandState::Completed,
            ErrorCode::Cancelled => CommandState::Cancelled,
            _ => CommandState::Failed,
        }
    }
}

/// Kill request of one command.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl KillSwitch {
    /// A switch that has not fired.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask the job to stop. Idempotent.
    pub fn kill(&self) {
        self.tx.send_replace(true);
    }

    /// Whether a kill was requested.
    pub fn is_killed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Observer handed to the job.
    pub fn signal(&self) -> KillSignal {
        KillSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Job-side view of a [`KillSwitch`].
#[derive(Debug, Clone)]
pub struct KillSignal {
    rx: watch::Receiver<bool>,
}

impl KillSignal {
    /// Whether a kill was requested.
    pub fn is_killed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail with `Cancelled` if a kill was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_killed() {
            Err(AdminError::cancelled("killed"))
        } else {
            Ok(())
        }
    }

    /// Resolve once a kill is requested.
    pub async fn killed(&mut self) {
        // A dropped switch can never fire.
        if self.rx.wait_for(|killed| *killed).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// State shared between a command object and its job.
#[derive(Debug)]
pub struct Lifecycle {
    address: CommandAddress,
    state: Mutex<CommandState>,
    emitter: EventEmitter,
    registry: Weak<CommandRegistry>,
}

impl Lifecycle {
    pub(crate) fn new(
        address: CommandAddress,
        emitter: EventEmitter,
        registry: Weak<CommandRegistry>,
    ) -> Self {
        Self {
            address,
            state: Mutex::new(CommandState::Created),
            emitter,
            registry,
        }
    }

    /// Current state.
    pub fn state(&self) -> CommandState {
        *self.state.lock()
    }

    /// Move to `next`; illegal transitions are refused.
    pub fn transition(&self, next: CommandState) -> Result<()> {
        let mut state = self.state.lock();
        if !state.can_become(next) {
            return Err(AdminError::invalid(format!(
                "{} cannot go from {:?} to {next:?}",
                self.address, *state
            )));
        }
        *state = next;
        Ok(())
    }

    /// Record the outcome, emit the terminal event and unregister.
    ///
    /// Only the first call has any effect.
    pub fn finish(&self, result: CommandResult) {
        if let Err(err) = self.transition(CommandState::for_result(&result)) {
            debug!(address = %self.address, error = %err, "command already finished");
            return;
        }
        if result.is_success() {
            info!(address = %self.address, "command completed");
        } else {
            info!(address = %self.address, code = %result.code, message = %result.message, "command failed");
        }
        self.emitter.emit(CommandEvent::Result(result));
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.address);
        }
    }
}

/// What a job gets to work with.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Address of the command running the job
    pub address: CommandAddress,
    /// Progress events
    pub events: EventEmitter,
    /// Kill requests
    pub kill: KillSignal,
    /// Runtime configuration
    pub config: Arc<AdminConfig>,
    pub(crate) lifecycle: Arc<Lifecycle>,
}

impl JobContext {
    /// Emit one progress event.
    pub fn emit(&self, event: CommandEvent) {
        self.events.emit(event);
    }
}

/// A job's body.
pub type JobFuture = BoxFuture<'static, Result<()>>;

/// Run `job` as a task and turn its result into the terminal event.
///
/// A job that ends after a kill was requested reports `Cancelled` unless it
/// failed for another reason first.
pub fn spawn_job(ctx: JobContext, job: JobFuture) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = job.await;
        let killed = ctx.kill.is_killed();
        let result = match outcome {
            Ok(()) if killed => CommandResult::failure(ErrorCode::Cancelled, "killed"),
            Ok(()) => CommandResult::success(),
            Err(err) => {
                if killed && !err.is_cancelled() {
                    debug!(address = %ctx.address, error = %err, "job failed after kill");
                }
                CommandResult::from_error(&err)
            }
        };
        if !result.is_success() && result.code == ErrorCode::Internal {
            warn!(address = %ctx.address, message = %result.message, "job hit an internal error");
        }
        ctx.lifecycle.finish(result);
    })
}
