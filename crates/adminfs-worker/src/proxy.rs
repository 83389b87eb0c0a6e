//! One method per filesystem call, each driving one helper command.

use crate::file::FileSession;
use crate::host::WorkerHost;
use crate::wait::{Transfer, Wait};
use adminfs_authorization::{AuthorizationDebounce, AuthorizationGate, Outcome};
use adminfs_core::{
    AdminConfig, AdminError, CallerId, Command, CommandAddress, CommandEvent, ControlCall,
    ControlReply, JobFlags, Locator, OpenMode, Request, Result,
};
use adminfs_helper::HelperBus;
use adminfs_stream::{split_message, PipeEndpoint, StreamPipe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Translates filesystem calls into helper commands on behalf of `caller`.
pub struct WorkerProxy {
    bus: Arc<dyn HelperBus>,
    caller: CallerId,
    debounce: AuthorizationDebounce,
    config: Arc<AdminConfig>,
    gate: Option<AuthorizationGate>,
}

impl std::fmt::Debug for WorkerProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProxy")
            .field("caller", &self.caller)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl WorkerProxy {
    /// Proxy for `caller`, sharing read decisions through `debounce`.
    pub fn new(
        bus: Arc<dyn HelperBus>,
        caller: CallerId,
        debounce: AuthorizationDebounce,
        config: Arc<AdminConfig>,
    ) -> Self {
        Self {
            bus,
            caller,
            debounce,
            config,
            gate: None,
        }
    }

    /// Gate consulted by [`wait_until_authorization_expired`](Self::wait_until_authorization_expired).
    pub fn with_gate(mut self, gate: AuthorizationGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Caller this proxy acts for.
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    fn wait(&self, address: CommandAddress) -> Wait<'_> {
        Wait {
            bus: self.bus.as_ref(),
            caller: &self.caller,
            address,
            poll: self.config.kill_poll_interval(),
            max_message_size: self.config.max_message_size,
        }
    }

    async fn create(
        &self,
        command: Command,
        endpoint: Option<PipeEndpoint>,
    ) -> Result<CommandAddress> {
        let verb = command.verb();
        let request = Request::new(self.caller.clone(), command);
        match self.bus.create(request, endpoint).await {
            Ok(address) => {
                debug!(address = %address, "command created");
                Ok(address)
            }
            Err(err) if err.is_access_denied() => Err(err),
            Err(err) => {
                warn!(verb = %verb, error = %err, "command creation failed");
                Err(AdminError::transport(format!(
                    "cannot create {verb} command: {}",
                    err.message()
                )))
            }
        }
    }

    /// Create a read-type command, reusing a recent similar decision.
    async fn create_read(&self, command: Command) -> Result<CommandAddress> {
        let mut request = self.debounce.begin();
        if let Some(Outcome::Denied) = self
            .debounce
            .result_of_previous_request_similar_to(&request)
            .await
        {
            debug!(caller = %self.caller, verb = %command.verb(), "read denied by a recent decision");
            return Err(AdminError::access_denied(format!(
                "{} was recently denied {}",
                self.caller,
                command.verb()
            )));
        }

        let created = self.create(command, None).await;
        request.set_outcome(match created {
            Ok(_) => Outcome::Allowed,
            Err(_) => Outcome::Denied,
        });
        self.debounce.consider_remembering(&request);
        created
    }

    async fn run(
        &self,
        address: CommandAddress,
        transfer: Transfer,
        host: &dyn WorkerHost,
    ) -> Result<()> {
        let mut events = self.bus.subscribe(&self.caller, address).await?;
        if let Err(err) = self
            .bus
            .control(&self.caller, address, ControlCall::Start)
            .await
        {
            debug!(address = %address, error = %err, "start refused");
            return Err(err);
        }
        self.wait(address)
            .until_result(&mut events, transfer, host)
            .await
    }

    async fn simple(&self, command: Command, host: &dyn WorkerHost) -> Result<()> {
        let address = self.create(command, None).await?;
        self.run(address, Transfer::None, host).await
    }

    /// List a directory; entries arrive through `list_entries`.
    pub async fn list_dir(&self, url: Locator, host: &dyn WorkerHost) -> Result<()> {
        let address = self.create_read(Command::ListDir { url }).await?;
        self.run(address, Transfer::None, host).await
    }

    /// Describe a resource through `stat_entry`.
    pub async fn stat(&self, url: Locator, host: &dyn WorkerHost) -> Result<()> {
        let address = self.create_read(Command::Stat { url }).await?;
        self.run(address, Transfer::None, host).await
    }

    /// Read a file; content arrives through `data` in message-sized pieces.
    pub async fn get(&self, url: Locator, host: &dyn WorkerHost) -> Result<()> {
        let (writer, reader) = StreamPipe::open()?;
        let address = self
            .create(Command::Get { url }, Some(PipeEndpoint::Writer(writer)))
            .await?;
        self.run(address, Transfer::Download(reader), host).await
    }

    /// Write a file from chunks supplied by `request_data`.
    pub async fn put(
        &self,
        url: Locator,
        permissions: Option<u32>,
        flags: JobFlags,
        host: &dyn WorkerHost,
    ) -> Result<()> {
        let (writer, reader) = StreamPipe::open()?;
        let command = Command::Put {
            url,
            permissions,
            flags,
        };
        let address = self
            .create(command, Some(PipeEndpoint::Reader(reader)))
            .await?;
        self.run(address, Transfer::Upload(writer), host).await
    }

    /// Copy `src` to `dst`.
    pub async fn copy(
        &self,
        src: Locator,
        dst: Locator,
        permissions: Option<u32>,
        flags: JobFlags,
        host: &dyn WorkerHost,
    ) -> Result<()> {
        let command = Command::Copy {
            src,
            dst,
            permissions,
            flags,
        };
        self.simple(command, host).await
    }

    /// Delete a resource, recursively for directories.
    pub async fn del(&self, url: Locator, host: &dyn WorkerHost) -> Result<()> {
        self.simple(Command::Del { url }, host).await
    }

    /// Create a directory.
    pub async fn mkdir(
        &self,
        url: Locator,
        permissions: Option<u32>,
        host: &dyn WorkerHost,
    ) -> Result<()> {
        self.simple(Command::Mkdir { url, permissions }, host).await
    }

    /// Rename `src` to `dst`.
    pub async fn rename(
        &self,
        src: Locator,
        dst: Locator,
        flags: JobFlags,
        host: &dyn WorkerHost,
    ) -> Result<()> {
        self.simple(Command::Rename { src, dst, flags }, host).await
    }

    /// Change permission bits.
    pub async fn chmod(&self, url: Locator, permissions: u32, host: &dyn WorkerHost) -> Result<()> {
        self.simple(Command::Chmod { url, permissions }, host).await
    }

    /// Change owner and group; an empty name leaves that part alone.
    pub async fn chown(
        &self,
        url: Locator,
        owner: &str,
        group: &str,
        host: &dyn WorkerHost,
    ) -> Result<()> {
        let command = Command::Chown {
            url,
            owner: owner.to_string(),
            group: group.to_string(),
        };
        self.simple(command, host).await
    }

    /// Open a file for sub-operations.
    pub async fn open(
        &self,
        url: Locator,
        mode: OpenMode,
        host: &dyn WorkerHost,
    ) -> Result<FileSession> {
        let address = self.create(Command::File { url, mode }, None).await?;
        let events = self.bus.subscribe(&self.caller, address).await?;
        let mut session = FileSession {
            address,
            events,
            finished: false,
        };
        self.bus
            .control(&self.caller, address, ControlCall::Start)
            .await?;
        session
            .wait_for(host, self.config.kill_poll_interval(), |event| {
                matches!(event, CommandEvent::Opened)
            })
            .await?;
        info!(address = %address, "file opened");
        Ok(session)
    }

    async fn file_call(&self, session: &FileSession, call: ControlCall) -> Result<ControlReply> {
        session.ensure_open()?;
        self.bus.control(&self.caller, session.address, call).await
    }

    /// Read up to `len` bytes at the current offset.
    pub async fn read(&self, session: &mut FileSession, len: u64, host: &dyn WorkerHost) -> Result<()> {
        self.file_call(session, ControlCall::Read(len)).await?;
        session
            .wait_for(host, self.config.kill_poll_interval(), |event| {
                matches!(event, CommandEvent::Data(_))
            })
            .await
    }

    /// Write `data` at the current offset, in message-sized pieces.
    pub async fn write(&self, session: &mut FileSession, data: &[u8], host: &dyn WorkerHost) -> Result<()> {
        for piece in split_message(data, self.config.max_message_size) {
            let mut outstanding = piece.len() as u64;
            self.file_call(session, ControlCall::Write(piece.to_vec()))
                .await?;
            session
                .wait_for(host, self.config.kill_poll_interval(), |event| match event {
                    CommandEvent::Written(len) => {
                        outstanding = outstanding.saturating_sub(*len);
                        outstanding == 0
                    }
                    _ => false,
                })
                .await?;
        }
        Ok(())
    }

    /// Move to absolute `offset`.
    pub async fn seek(&self, session: &mut FileSession, offset: u64, host: &dyn WorkerHost) -> Result<()> {
        self.file_call(session, ControlCall::Seek(offset)).await?;
        session
            .wait_for(host, self.config.kill_poll_interval(), |event| {
                matches!(event, CommandEvent::PositionChanged(_))
            })
            .await
    }

    /// Truncate to `len` bytes.
    pub async fn truncate(&self, session: &mut FileSession, len: u64, host: &dyn WorkerHost) -> Result<()> {
        self.file_call(session, ControlCall::Truncate(len)).await?;
        session
            .wait_for(host, self.config.kill_poll_interval(), |event| {
                matches!(event, CommandEvent::Truncated(_))
            })
            .await
    }

    /// Current size of the open file.
    pub async fn size(&self, session: &FileSession) -> Result<u64> {
        match self.file_call(session, ControlCall::Size).await? {
            ControlReply::Size(size) => Ok(size),
            ControlReply::Done => Err(AdminError::internal("size call answered without a size")),
        }
    }

    /// Close the file and wait for the command's result.
    pub async fn close(&self, session: &mut FileSession, host: &dyn WorkerHost) -> Result<()> {
        self.file_call(session, ControlCall::Close).await?;
        let closed = session
            .wait_for(host, self.config.kill_poll_interval(), |event| {
                matches!(event, CommandEvent::Closed)
            })
            .await;
        match closed {
            // A cancelled close still collects the terminal result.
            Err(err) if !err.is_cancelled() => return Err(err),
            _ => {}
        }
        session.finish(self.wait(session.address), host).await
    }

    /// Return once the caller's authorization has lapsed, or the host
    /// cancels. Checks every honor window.
    pub async fn wait_until_authorization_expired(&self, host: &dyn WorkerHost) -> Result<()> {
        let gate = self
            .gate
            .as_ref()
            .ok_or_else(|| AdminError::invalid("no authorization gate configured"))?;
        gate.wait_until_expired(&self.caller, self.config.honor_window(), || host.was_killed())
            .await
    }
}
