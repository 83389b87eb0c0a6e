use crate::host::WorkerHost;
use crate::wait::{deliver, Transfer, Wait};
use adminfs_core::{AdminError, CommandAddress, CommandEvent, Result};
use adminfs_helper::EventStream;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// An opened `file` command, reused by every sub-operation until closed.
#[derive(Debug)]
pub struct FileSession {
    pub(crate) address: CommandAddress,
    pub(crate) events: EventStream,
    pub(crate) finished: bool,
}

impl FileSession {
    /// Address of the underlying command.
    pub fn address(&self) -> CommandAddress {
        self.address
    }

    /// Whether the command has delivered its terminal result.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.finished {
            Err(AdminError::invalid(format!("{} is closed", self.address)))
        } else {
            Ok(())
        }
    }

    /// Forward events to `host` until `done` accepts one.
    ///
    /// A terminal result before that ends the session and is returned as
    /// the call's failure. A cancellation seen on the host while waiting
    /// turns the answer into `Cancelled`; the session stays open.
    pub(crate) async fn wait_for<F>(
        &mut self,
        host: &dyn WorkerHost,
        poll: Duration,
        mut done: F,
    ) -> Result<()>
    where
        F: FnMut(&CommandEvent) -> bool + Send,
    {
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cancel_seen = false;
        loop {
            let event = tokio::select! {
                biased;

                _ = ticker.tick(), if !cancel_seen => {
                    cancel_seen = host.was_killed();
                    continue;
                }
                event = self.events.next() => event,
            };
            let Some(event) = event else {
                self.finished = true;
                return Err(AdminError::transport(format!(
                    "{} ended without a result",
                    self.address
                )));
            };
            if let CommandEvent::Result(result) = event {
                self.finished = true;
                result.into_result()?;
                return Err(AdminError::invalid(format!(
                    "{} finished before answering",
                    self.address
                )));
            }
            let accepted = done(&event);
            deliver(host, event).await;
            if accepted {
                if cancel_seen {
                    debug!(address = %self.address, "file call answered after cancellation");
                    return Err(AdminError::cancelled(format!(
                        "{} call was cancelled",
                        self.address
                    )));
                }
                return Ok(());
            }
        }
    }

    /// Wait for the terminal result after `closed`.
    pub(crate) async fn finish(&mut self, wait: Wait<'_>, host: &dyn WorkerHost) -> Result<()> {
        let outcome = wait
            .until_result(&mut self.events, Transfer::None, host)
            .await;
        self.finished = true;
        outcome
    }
}
