use super::{exists, set_mode, write_error};
use crate::command::VerbCommand;
use crate::job::{spawn_job, JobContext};
use adminfs_core::{
    AdminError, CommandEvent, ControlCall, ControlReply, ErrorCode, JobFlags, Result, Verb,
};
use adminfs_stream::PipeReader;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

/// Writes a file from frames pulled through the stream pipe.
///
/// Each `dataRequest` event is answered by the caller pushing one frame into
/// the pipe and then sending the `Data` control call.
#[derive(Debug)]
pub struct PutCommand {
    path: PathBuf,
    permissions: Option<u32>,
    flags: JobFlags,
    reader: Mutex<Option<PipeReader>>,
    data_tx: mpsc::UnboundedSender<()>,
    data_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl PutCommand {
    /// Put into `path` reading from `reader`.
    pub fn new(path: PathBuf, permissions: Option<u32>, flags: JobFlags, reader: PipeReader) -> Self {
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        Self {
            path,
            permissions,
            flags,
            reader: Mutex::new(Some(reader)),
            data_tx,
            data_rx: Mutex::new(Some(data_rx)),
        }
    }
}

#[async_trait]
impl VerbCommand for PutCommand {
    fn verb(&self) -> Verb {
        Verb::Put
    }

    fn start(&self, ctx: JobContext) -> Result<()> {
        let reader = self.reader.lock().take();
        let data_rx = self.data_rx.lock().take();
        let (Some(reader), Some(data_rx)) = (reader, data_rx) else {
            return Err(AdminError::invalid("put already started"));
        };
        let job = run(
            ctx.clone(),
            self.path.clone(),
            self.permissions,
            self.flags,
            reader,
            data_rx,
        );
        spawn_job(ctx, Box::pin(job));
        Ok(())
    }

    async fn control(&self, call: ControlCall) -> Result<ControlReply> {
        match call {
            ControlCall::Data => {
                self.data_tx
                    .send(())
                    .map_err(|_| AdminError::invalid("put is no longer accepting data"))?;
                Ok(ControlReply::Done)
            }
            other => Err(AdminError::invalid(format!(
                "put does not accept {}",
                other.name()
            ))),
        }
    }
}

async fn run(
    ctx: JobContext,
    path: PathBuf,
    permissions: Option<u32>,
    flags: JobFlags,
    mut reader: PipeReader,
    mut data_rx: mpsc::UnboundedReceiver<()>,
) -> Result<()> {
    let resume = flags.contains(JobFlags::RESUME);
    if exists(&path).await && !flags.contains(JobFlags::OVERWRITE) && !resume {
        return Err(AdminError::operation(
            ErrorCode::AlreadyExists,
            format!("{} already exists", path.display()),
        ));
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true);
    if resume {
        options.append(true);
    } else {
        options.truncate(true);
    }
    let mut file = options.open(&path).await.map_err(write_error)?;

    let mut kill = ctx.kill.clone();
    let mut written = 0u64;
    loop {
        ctx.emit(CommandEvent::DataRequest);
        tokio::select! {
            biased;
            _ = kill.killed() => return Err(AdminError::cancelled("put killed")),
            signal = data_rx.recv() => {
                if signal.is_none() {
                    return Err(AdminError::internal("put command dropped"));
                }
            }
        }
        let frame = tokio::select! {
            biased;
            _ = kill.killed() => return Err(AdminError::cancelled("put killed")),
            frame = reader.next_frame() => frame?,
        };
        let Some(chunk) = frame else {
            break;
        };
        file.write_all(&chunk).await.map_err(write_error)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(write_error)?;
    file.sync_all().await.map_err(write_error)?;
    drop(file);

    if let Some(mode) = permissions {
        set_mode(&path, mode).await?;
    }
    debug!(path = %path.display(), bytes = written, "file received");
    Ok(())
}
