use super::{guess_mime, read_error};
use crate::job::JobContext;
use adminfs_core::{AdminError, CommandEvent, ErrorCode, Result};
use adminfs_stream::PipeWriter;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::debug;

const SNIFF_LEN: usize = 512;

/// Stream the file at `path` into the pipe, then the end marker.
pub(super) async fn run(ctx: JobContext, path: PathBuf, mut writer: PipeWriter) -> Result<()> {
    let metadata = tokio::fs::metadata(&path).await.map_err(read_error)?;
    if metadata.is_dir() {
        return Err(AdminError::operation(
            ErrorCode::IsDirectory,
            format!("{} is a directory", path.display()),
        ));
    }
    let mut file = tokio::fs::File::open(&path).await.map_err(read_error)?;

    let chunk_size = ctx.config.transfer_chunk_size.max(1);
    let mut buf = vec![0u8; chunk_size.max(SNIFF_LEN)];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = file.read(&mut buf[filled..]).await.map_err(read_error)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    ctx.emit(CommandEvent::MimeTypeFound(
        guess_mime(&path, Some(&buf[..filled.min(SNIFF_LEN)])).to_string(),
    ));

    let mut kill = ctx.kill.clone();
    let mut sent = 0u64;
    let mut pending = filled;
    loop {
        for piece in buf[..pending].chunks(chunk_size) {
            tokio::select! {
                biased;
                _ = kill.killed() => return Err(AdminError::cancelled("get killed")),
                written = writer.write_chunk(piece) => written?,
            }
            sent += piece.len() as u64;
        }
        pending = file.read(&mut buf).await.map_err(read_error)?;
        if pending == 0 {
            break;
        }
    }
    writer.finish().await?;
    debug!(path = %path.display(), bytes = sent, "file sent");
    Ok(())
}
