use super::write_error;
use crate::job::{JobContext, KillSignal};
use adminfs_core::{AdminError, ErrorCode, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Delete a file, or a directory with everything below it.
pub(super) async fn run(ctx: JobContext, path: PathBuf) -> Result<()> {
    let metadata = tokio::fs::symlink_metadata(&path)
        .await
        .map_err(|e| AdminError::from_io(&e, ErrorCode::CannotWrite))?;
    if !metadata.is_dir() {
        return tokio::fs::remove_file(&path).await.map_err(write_error);
    }

    let kill = ctx.kill.clone();
    tokio::task::spawn_blocking(move || remove_tree(&path, &kill))
        .await
        .map_err(|e| AdminError::internal(format!("delete task failed: {e}")))?
}

fn remove_tree(root: &Path, kill: &KillSignal) -> Result<()> {
    let mut removed = 0usize;
    for entry in WalkDir::new(root).contents_first(true).follow_links(false) {
        kill.check()?;
        let entry = entry.map_err(|e| {
            let message = e.to_string();
            match e.into_io_error() {
                Some(io) => write_error(io),
                None => AdminError::operation(ErrorCode::CannotWrite, message),
            }
        })?;
        if entry.file_type().is_dir() {
            std::fs::remove_dir(entry.path()).map_err(write_error)?;
        } else {
            std::fs::remove_file(entry.path()).map_err(write_error)?;
        }
        removed += 1;
    }
    debug!(root = %root.display(), removed, "tree deleted");
    Ok(())
}
