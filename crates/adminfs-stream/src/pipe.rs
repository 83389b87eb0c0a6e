use adminfs_core::{AdminError, ErrorCode, Result};
use std::io;
use tokio::net::unix::pipe;
use tracing::{debug, trace};

/// Largest frame payload a reader accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const HEADER_LEN: usize = 4;
const READ_BUF_LEN: usize = 64 * 1024;

/// Constructor of connected pipe ends.
#[derive(Debug)]
pub struct StreamPipe;

impl StreamPipe {
    /// Open a new non-blocking pipe.
    pub fn open() -> Result<(PipeWriter, PipeReader)> {
        let (sender, receiver) =
            pipe::pipe().map_err(|e| AdminError::from_io(&e, ErrorCode::Internal))?;
        let writer = PipeWriter::new(sender);
        debug!(capacity = ?writer.capacity(), atomic = writer.atomic_write_size(), "stream pipe opened");
        Ok((writer, PipeReader::new(receiver)))
    }
}

/// End of a stream pipe handed to the helper out of band.
#[derive(Debug)]
pub enum PipeEndpoint {
    /// The helper produces data (Get)
    Writer(PipeWriter),
    /// The helper consumes data (Put)
    Reader(PipeReader),
}

impl PipeEndpoint {
    /// The write end, if this is one.
    pub fn into_writer(self) -> Option<PipeWriter> {
        match self {
            PipeEndpoint::Writer(writer) => Some(writer),
            PipeEndpoint::Reader(_) => None,
        }
    }

    /// The read end, if this is one.
    pub fn into_reader(self) -> Option<PipeReader> {
        match self {
            PipeEndpoint::Reader(reader) => Some(reader),
            PipeEndpoint::Writer(_) => None,
        }
    }
}

/// Producer end.
#[derive(Debug)]
pub struct PipeWriter {
    sender: pipe::Sender,
    atomic: usize,
}

impl PipeWriter {
    fn new(sender: pipe::Sender) -> Self {
        Self {
            sender,
            atomic: nix::libc::PIPE_BUF,
        }
    }

    /// Largest write the OS performs atomically.
    pub fn atomic_write_size(&self) -> usize {
        self.atomic
    }

    /// Buffer capacity of the pipe, where the platform reports it.
    pub fn capacity(&self) -> Option<usize> {
        pipe_capacity(&self.sender)
    }

    /// Write one frame. Empty chunks are refused; use [`finish`](Self::finish).
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.is_empty() {
            return Err(AdminError::invalid(
                "empty chunk; the end of data marker is written by finish()",
            ));
        }
        if chunk.len() > MAX_FRAME_LEN {
            return Err(AdminError::invalid(format!(
                "chunk of {} bytes exceeds the frame limit",
                chunk.len()
            )));
        }
        let len = u32::try_from(chunk.len())
            .map_err(|_| AdminError::invalid("chunk too large for a frame header"))?;
        self.write_all(&len.to_le_bytes()).await?;
        self.write_all(chunk).await?;
        trace!(len = chunk.len(), "frame written");
        Ok(())
    }

    /// Write the end-of-data marker.
    pub async fn finish(&mut self) -> Result<()> {
        self.write_all(&0u32.to_le_bytes()).await?;
        debug!("end of data written");
        Ok(())
    }

    async fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let len = buf.len().min(self.atomic);
            match self.sender.try_write(&buf[..len]) {
                Ok(0) => {
                    return Err(AdminError::operation(
                        ErrorCode::CannotWrite,
                        "stream pipe accepted no bytes",
                    ))
                }
                Ok(written) => buf = &buf[written..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.sender.writable().await.map_err(write_failed)?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(write_failed(e)),
            }
        }
        Ok(())
    }
}

fn write_failed(err: io::Error) -> AdminError {
    AdminError::operation(ErrorCode::CannotWrite, err.to_string())
}

fn read_failed(err: io::Error) -> AdminError {
    AdminError::operation(ErrorCode::CannotRead, err.to_string())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn pipe_capacity(sender: &pipe::Sender) -> Option<usize> {
    use nix::fcntl::{fcntl, FcntlArg};
    use std::os::unix::io::AsRawFd;

    fcntl(sender.as_raw_fd(), FcntlArg::F_GETPIPE_SZ)
        .ok()
        .and_then(|size| usize::try_from(size).ok())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn pipe_capacity(_sender: &pipe::Sender) -> Option<usize> {
    None
}

/// Frames completed by one [`PipeReader::drain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drained {
    /// Concatenated payloads
    pub blob: Vec<u8>,
    /// Whether the end-of-data marker was read
    pub end: bool,
}

enum Frame {
    Data(Vec<u8>),
    End,
}

/// Consumer end.
#[derive(Debug)]
pub struct PipeReader {
    receiver: pipe::Receiver,
    pending: Vec<u8>,
    ended: bool,
    closed: bool,
}

impl PipeReader {
    fn new(receiver: pipe::Receiver) -> Self {
        Self {
            receiver,
            pending: Vec::new(),
            ended: false,
            closed: false,
        }
    }

    /// Whether the end-of-data marker has been read.
    pub fn is_finished(&self) -> bool {
        self.ended
    }

    /// Wait for data, then return every frame completed so far.
    pub async fn drain(&mut self) -> Result<Drained> {
        let mut drained = Drained::default();
        loop {
            while let Some(frame) = self.take_frame()? {
                match frame {
                    Frame::Data(payload) => drained.blob.extend_from_slice(&payload),
                    Frame::End => {
                        drained.end = true;
                        break;
                    }
                }
            }
            if drained.end || self.ended {
                drained.end = true;
                return Ok(drained);
            }
            if !drained.blob.is_empty() {
                return Ok(drained);
            }
            self.fill().await?;
        }
    }

    /// Read exactly one frame. `None` is the end-of-data marker.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if self.ended {
                return Ok(None);
            }
            match self.take_frame()? {
                Some(Frame::Data(payload)) => return Ok(Some(payload)),
                Some(Frame::End) => return Ok(None),
                None => self.fill().await?,
            }
        }
    }

    fn take_frame(&mut self) -> Result<Option<Frame>> {
        if self.ended || self.pending.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.pending[..HEADER_LEN]);
        let len = u32::from_le_bytes(header) as usize;
        if len == 0 {
            self.pending.clear();
            self.ended = true;
            debug!("end of data read");
            return Ok(Some(Frame::End));
        }
        if len > MAX_FRAME_LEN {
            return Err(AdminError::operation(
                ErrorCode::CannotRead,
                format!("frame of {len} bytes exceeds the frame limit"),
            ));
        }
        if self.pending.len() < HEADER_LEN + len {
            return Ok(None);
        }
        let payload = self.pending[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.pending.drain(..HEADER_LEN + len);
        Ok(Some(Frame::Data(payload)))
    }

    /// Await readiness and read everything currently available.
    async fn fill(&mut self) -> Result<()> {
        if self.closed {
            return Err(AdminError::operation(
                ErrorCode::CannotRead,
                "stream closed before end of data",
            ));
        }
        self.receiver.readable().await.map_err(read_failed)?;
        let mut buf = vec![0u8; READ_BUF_LEN];
        loop {
            match self.receiver.try_read(&mut buf) {
                Ok(0) => {
                    self.closed = true;
                    return Ok(());
                }
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(read_failed(e)),
            }
        }
    }
}
