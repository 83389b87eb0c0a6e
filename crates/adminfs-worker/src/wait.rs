//! Waiting for a started command to finish.

use crate::host::WorkerHost;
use adminfs_core::{
    AdminError, CallerId, CommandAddress, CommandEvent, CommandResult, ControlCall, Result,
};
use adminfs_helper::{EventStream, HelperBus};
use adminfs_stream::{split_message, Drained, PipeReader, PipeWriter};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Pipe end the worker keeps for a streaming verb.
pub(crate) enum Transfer {
    None,
    Download(PipeReader),
    Upload(PipeWriter),
}

/// One started command and the channel to reach it.
pub(crate) struct Wait<'a> {
    pub bus: &'a dyn HelperBus,
    pub caller: &'a CallerId,
    pub address: CommandAddress,
    pub poll: Duration,
    pub max_message_size: usize,
}

impl Wait<'_> {
    /// Forward progress to `host` until the terminal result arrives.
    ///
    /// A download also waits for the end-of-data marker after a successful
    /// result. Cancellation seen on the host is forwarded once as `kill`
    /// when the verb allows it; either way a success after it is reported
    /// as cancelled.
    pub(crate) async fn until_result(
        &self,
        events: &mut EventStream,
        transfer: Transfer,
        host: &dyn WorkerHost,
    ) -> Result<()> {
        let (mut reader, mut writer) = match transfer {
            Transfer::None => (None, None),
            Transfer::Download(reader) => (Some(reader), None),
            Transfer::Upload(writer) => (None, Some(writer)),
        };
        let mut ticker = tokio::time::interval(self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cancel_seen = false;
        let mut kill_sent = false;
        let mut failure: Option<AdminError> = None;
        let mut outcome: Option<CommandResult> = None;
        let mut pending: VecDeque<Vec<u8>> = VecDeque::new();

        loop {
            if let Some(result) = &outcome {
                let draining = result.is_success()
                    && failure.is_none()
                    && reader.as_ref().is_some_and(|r| !r.is_finished());
                if !draining {
                    break;
                }
            }

            tokio::select! {
                biased;

                _ = ticker.tick(), if !cancel_seen => {
                    if host.was_killed() {
                        cancel_seen = true;
                        kill_sent = self.kill().await;
                    }
                }

                event = events.next(), if outcome.is_none() => match event {
                    None => {
                        return Err(AdminError::transport(format!(
                            "{} ended without a result",
                            self.address
                        )))
                    }
                    Some(CommandEvent::Result(result)) => {
                        debug!(address = %self.address, code = %result.code, "result received");
                        outcome = Some(result);
                    }
                    Some(CommandEvent::DataRequest) => {
                        if let Err(err) = self.answer(writer.as_mut(), &mut pending, host).await {
                            if !kill_sent {
                                warn!(address = %self.address, error = %err, "upload failed");
                                failure = Some(err);
                                kill_sent = self.kill().await;
                            }
                        }
                    }
                    Some(event) => deliver(host, event).await,
                },

                drained = drain(&mut reader) => match drained {
                    Ok(drained) => {
                        for piece in split_message(&drained.blob, self.max_message_size) {
                            host.data(piece.to_vec()).await;
                        }
                    }
                    Err(err) => {
                        reader = None;
                        if !kill_sent {
                            warn!(address = %self.address, error = %err, "download failed");
                            failure = Some(err);
                            kill_sent = self.kill().await;
                        }
                    }
                },
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        let result = outcome
            .ok_or_else(|| AdminError::internal("wait finished without a result"))?
            .into_result();
        match result {
            Ok(()) if cancel_seen => Err(AdminError::cancelled(if kill_sent {
                format!("{} was killed", self.address)
            } else {
                format!("{} finished after cancellation", self.address)
            })),
            other => other,
        }
    }

    /// Send `kill` if the verb accepts it. Returns whether it was sent.
    pub(crate) async fn kill(&self) -> bool {
        if !self.address.verb().is_killable() {
            debug!(address = %self.address, "cancellation requested on a command that cannot be killed");
            return false;
        }
        info!(address = %self.address, "forwarding kill");
        if let Err(err) = self
            .bus
            .control(self.caller, self.address, ControlCall::Kill)
            .await
        {
            // The command may have finished in the meantime.
            debug!(address = %self.address, error = %err, "kill not delivered");
        }
        true
    }

    async fn answer(
        &self,
        writer: Option<&mut PipeWriter>,
        pending: &mut VecDeque<Vec<u8>>,
        host: &dyn WorkerHost,
    ) -> Result<()> {
        let writer =
            writer.ok_or_else(|| AdminError::internal("data requested without a stream pipe"))?;
        if pending.is_empty() {
            let chunk = host.request_data().await?;
            pending.extend(split_message(&chunk, self.max_message_size).map(<[u8]>::to_vec));
        }
        // The helper only reads after `data`, so signal before a write that
        // may fill the pipe.
        self.bus
            .control(self.caller, self.address, ControlCall::Data)
            .await?;
        match pending.pop_front() {
            Some(piece) => writer.write_chunk(&piece).await,
            None => writer.finish().await,
        }
    }
}

async fn drain(reader: &mut Option<PipeReader>) -> Result<Drained> {
    match reader {
        Some(reader) if !reader.is_finished() => reader.drain().await,
        _ => std::future::pending().await,
    }
}

/// Hand one progress event to the host.
pub(crate) async fn deliver(host: &dyn WorkerHost, event: CommandEvent) {
    match event {
        CommandEvent::Entries(entries) => host.list_entries(entries).await,
        CommandEvent::StatRecord(record) => host.stat_entry(record).await,
        CommandEvent::Data(blob) => host.data(blob).await,
        CommandEvent::MimeTypeFound(mime) => host.mime_type(mime).await,
        CommandEvent::Written(len) => host.written(len).await,
        CommandEvent::PositionChanged(offset) => host.position(offset).await,
        CommandEvent::Truncated(len) => host.truncated(len).await,
        other => debug!(event = other.name(), "event not forwarded"),
    }
}
