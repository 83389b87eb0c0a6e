//! Host wired to the terminal: records go to stdout as JSON lines, file
//! content goes to stdout raw, uploads come from stdin.

use adminfs_core::{AdminError, DirEntry, ErrorCode, Result, StatRecord};
use adminfs_worker::WorkerHost;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct TerminalHost<W, R> {
    out: Mutex<W>,
    input: Mutex<R>,
    chunk_size: usize,
    killed: Arc<AtomicBool>,
}

impl TerminalHost<tokio::io::Stdout, tokio::io::Stdin> {
    pub fn stdio(chunk_size: usize, killed: Arc<AtomicBool>) -> Self {
        Self::new(tokio::io::stdout(), tokio::io::stdin(), chunk_size, killed)
    }
}

impl<W, R> TerminalHost<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    pub fn new(out: W, input: R, chunk_size: usize, killed: Arc<AtomicBool>) -> Self {
        Self {
            out: Mutex::new(out),
            input: Mutex::new(input),
            chunk_size: chunk_size.max(1),
            killed,
        }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.out.into_inner()
    }

    async fn write(&self, bytes: &[u8]) {
        let mut out = self.out.lock().await;
        let written = match out.write_all(bytes).await {
            Ok(()) => out.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            warn!(error = %err, "cannot write to output");
        }
    }

    async fn json_line<T: Serialize>(&self, value: &T) {
        match serde_json::to_vec(value) {
            Ok(mut line) => {
                line.push(b'\n');
                self.write(&line).await;
            }
            Err(err) => warn!(error = %err, "cannot encode record"),
        }
    }
}

#[async_trait]
impl<W, R> WorkerHost for TerminalHost<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    async fn list_entries(&self, entries: Vec<DirEntry>) {
        for entry in &entries {
            self.json_line(entry).await;
        }
    }

    async fn stat_entry(&self, record: StatRecord) {
        self.json_line(&record).await;
    }

    async fn data(&self, blob: Vec<u8>) {
        self.write(&blob).await;
    }

    async fn mime_type(&self, mime: String) {
        debug!(mime = %mime, "content type");
    }

    async fn request_data(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.chunk_size];
        let read = self
            .input
            .lock()
            .await
            .read(&mut buf)
            .await
            .map_err(|e| AdminError::from_io(&e, ErrorCode::CannotRead))?;
        buf.truncate(read);
        Ok(buf)
    }

    fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}
