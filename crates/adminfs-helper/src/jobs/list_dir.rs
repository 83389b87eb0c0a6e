use super::{read_error, stat_record};
use crate::job::JobContext;
use adminfs_core::{AdminError, CommandEvent, ErrorCode, Result};
use std::path::PathBuf;
use tracing::debug;

/// List `path` in batches; the first batch starts with `.`.
pub(super) async fn run(ctx: JobContext, path: PathBuf) -> Result<()> {
    let batch_size = ctx.config.list_batch_size.max(1);

    let own = stat_record(&path, ".".to_string()).await?;
    if !own.is_dir() {
        return Err(AdminError::operation(
            ErrorCode::NotDirectory,
            format!("{} is not a directory", path.display()),
        ));
    }

    let mut dir = tokio::fs::read_dir(&path).await.map_err(read_error)?;
    let mut batch = vec![own];
    let mut total = 0usize;
    while let Some(entry) = dir.next_entry().await.map_err(read_error)? {
        ctx.kill.check()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let record = match stat_record(&entry.path(), name).await {
            Ok(record) => record,
            // Entries can vanish while listing.
            Err(err) => {
                debug!(entry = ?entry.path(), error = %err, "skipping entry");
                continue;
            }
        };
        if batch.len() >= batch_size {
            total += batch.len();
            ctx.emit(CommandEvent::Entries(std::mem::take(&mut batch)));
        }
        batch.push(record);
    }
    if !batch.is_empty() {
        total += batch.len();
        ctx.emit(CommandEvent::Entries(batch));
    }
    debug!(path = %path.display(), entries = total, "directory listed");
    Ok(())
}
