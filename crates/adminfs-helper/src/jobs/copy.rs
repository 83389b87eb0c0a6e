use super::{exists, read_error, set_mode, write_error};
use crate::job::JobContext;
use adminfs_core::{AdminError, ErrorCode, JobFlags, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Copy a regular file; the destination keeps the source mode unless
/// `permissions` says otherwise.
pub(super) async fn run(
    ctx: JobContext,
    src: PathBuf,
    dst: PathBuf,
    permissions: Option<u32>,
    flags: JobFlags,
) -> Result<()> {
    let metadata = tokio::fs::metadata(&src).await.map_err(read_error)?;
    if metadata.is_dir() {
        return Err(AdminError::operation(
            ErrorCode::IsDirectory,
            format!("{} is a directory", src.display()),
        ));
    }
    if exists(&dst).await && !flags.contains(JobFlags::OVERWRITE) {
        return Err(AdminError::operation(
            ErrorCode::AlreadyExists,
            format!("{} already exists", dst.display()),
        ));
    }

    let mut input = tokio::fs::File::open(&src).await.map_err(read_error)?;
    let mut output = tokio::fs::File::create(&dst).await.map_err(write_error)?;
    let mut buf = vec![0u8; ctx.config.transfer_chunk_size.max(1)];
    loop {
        ctx.kill.check()?;
        let n = input.read(&mut buf).await.map_err(read_error)?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n]).await.map_err(write_error)?;
    }
    output.flush().await.map_err(write_error)?;
    drop(output);

    let mode = permissions.unwrap_or(metadata.permissions().mode() & 0o7777);
    set_mode(&dst, mode).await
}
