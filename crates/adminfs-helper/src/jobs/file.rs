use super::{guess_mime, read_error, write_error};
use crate::command::VerbCommand;
use crate::job::{spawn_job, JobContext};
use adminfs_core::{
    AdminError, CommandEvent, ControlCall, ControlReply, OpenMode, Result, Verb,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

enum FileOp {
    Read(u64),
    Write(Vec<u8>),
    Seek(u64),
    Truncate(u64),
    Size(oneshot::Sender<Result<u64>>),
    Close,
}

/// An open file serving read/write/seek/truncate/size/close.
///
/// `start` opens the file; `close` ends the command.
#[derive(Debug)]
pub struct FileCommand {
    path: PathBuf,
    mode: OpenMode,
    ops_tx: mpsc::UnboundedSender<FileOp>,
    ops_rx: Mutex<Option<mpsc::UnboundedReceiver<FileOp>>>,
}

impl std::fmt::Debug for FileOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOp::Read(n) => write!(f, "Read({n})"),
            FileOp::Write(data) => write!(f, "Write({} bytes)", data.len()),
            FileOp::Seek(offset) => write!(f, "Seek({offset})"),
            FileOp::Truncate(len) => write!(f, "Truncate({len})"),
            FileOp::Size(_) => f.write_str("Size"),
            FileOp::Close => f.write_str("Close"),
        }
    }
}

impl FileCommand {
    /// File command for `path` opened with `mode`.
    pub fn new(path: PathBuf, mode: OpenMode) -> Self {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        Self {
            path,
            mode,
            ops_tx,
            ops_rx: Mutex::new(Some(ops_rx)),
        }
    }

    fn submit(&self, op: FileOp) -> Result<()> {
        self.ops_tx
            .send(op)
            .map_err(|_| AdminError::invalid("file is closed"))
    }
}

#[async_trait]
impl VerbCommand for FileCommand {
    fn verb(&self) -> Verb {
        Verb::File
    }

    fn start(&self, ctx: JobContext) -> Result<()> {
        let ops = self
            .ops_rx
            .lock()
            .take()
            .ok_or_else(|| AdminError::invalid("file already opened"))?;
        let job = serve(ctx.clone(), self.path.clone(), self.mode, ops);
        spawn_job(ctx, Box::pin(job));
        Ok(())
    }

    async fn control(&self, call: ControlCall) -> Result<ControlReply> {
        match call {
            ControlCall::Read(n) => self.submit(FileOp::Read(n))?,
            ControlCall::Write(data) => self.submit(FileOp::Write(data))?,
            ControlCall::Seek(offset) => self.submit(FileOp::Seek(offset))?,
            ControlCall::Truncate(len) => self.submit(FileOp::Truncate(len))?,
            ControlCall::Close => self.submit(FileOp::Close)?,
            ControlCall::Size => {
                let (tx, rx) = oneshot::channel();
                self.submit(FileOp::Size(tx))?;
                let size = rx
                    .await
                    .map_err(|_| AdminError::invalid("file closed before reporting its size"))??;
                return Ok(ControlReply::Size(size));
            }
            other => {
                return Err(AdminError::invalid(format!(
                    "file does not accept {}",
                    other.name()
                )))
            }
        }
        Ok(ControlReply::Done)
    }
}

async fn open(path: &Path, mode: OpenMode) -> Result<File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.read(mode.contains(OpenMode::READ));
    if mode.is_writable() {
        options
            .write(true)
            .create(true)
            .append(mode.contains(OpenMode::APPEND))
            .truncate(mode.contains(OpenMode::TRUNCATE));
    }
    let opened = options.open(path).await;
    if mode.is_writable() {
        opened.map_err(write_error)
    } else {
        opened.map_err(read_error)
    }
}

async fn size_of(file: &mut File) -> std::io::Result<u64> {
    // Pending writes must land before the length is read.
    file.flush().await?;
    Ok(file.metadata().await?.len())
}

async fn serve(
    ctx: JobContext,
    path: PathBuf,
    mode: OpenMode,
    mut ops: mpsc::UnboundedReceiver<FileOp>,
) -> Result<()> {
    let mut file = open(&path, mode).await?;
    if mode.contains(OpenMode::READ) {
        let mut head = vec![0u8; 512];
        let n = file.read(&mut head).await.map_err(read_error)?;
        file.seek(SeekFrom::Start(0)).await.map_err(read_error)?;
        ctx.emit(CommandEvent::MimeTypeFound(
            guess_mime(&path, Some(&head[..n])).to_string(),
        ));
    }
    ctx.emit(CommandEvent::Opened);
    debug!(path = %path.display(), mode = mode.bits(), "file opened");

    let max_read = ctx.config.max_message_size as u64;
    loop {
        let op = tokio::select! {
            op = ops.recv() => op,
            () = ctx.events.subscriber_gone() => {
                debug!(path = %path.display(), "subscriber gone, closing file");
                return Err(AdminError::cancelled("subscriber went away"));
            }
        };
        // Every sender is gone: the command object was torn down.
        let Some(op) = op else { return Ok(()) };
        match op {
            FileOp::Read(n) => {
                let want = usize::try_from(n.min(max_read)).unwrap_or(usize::MAX);
                let mut buf = vec![0u8; want];
                let mut filled = 0;
                while filled < want {
                    let got = file.read(&mut buf[filled..]).await.map_err(read_error)?;
                    if got == 0 {
                        break;
                    }
                    filled += got;
                }
                buf.truncate(filled);
                ctx.emit(CommandEvent::Data(buf));
            }
            FileOp::Write(data) => {
                file.write_all(&data).await.map_err(write_error)?;
                file.flush().await.map_err(write_error)?;
                ctx.emit(CommandEvent::Written(data.len() as u64));
            }
            FileOp::Seek(offset) => {
                let position = file.seek(SeekFrom::Start(offset)).await.map_err(read_error)?;
                ctx.emit(CommandEvent::PositionChanged(position));
            }
            FileOp::Truncate(len) => {
                file.set_len(len).await.map_err(write_error)?;
                ctx.emit(CommandEvent::Truncated(len));
            }
            FileOp::Size(reply) => match size_of(&mut file).await {
                Ok(size) => {
                    let _ = reply.send(Ok(size));
                }
                Err(err) => {
                    let err = read_error(err);
                    let _ = reply.send(Err(err.clone()));
                    return Err(err);
                }
            },
            FileOp::Close => {
                file.flush().await.map_err(write_error)?;
                drop(file);
                ctx.emit(CommandEvent::Closed);
                return Ok(());
            }
        }
    }
}
