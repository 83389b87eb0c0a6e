use super::stat_record;
use crate::job::JobContext;
use adminfs_core::{CommandEvent, Locator, Result};
use std::path::PathBuf;

pub(super) async fn run(ctx: JobContext, path: PathBuf) -> Result<()> {
    let name = Locator::from_path(&path)?.file_name();
    let record = stat_record(&path, name).await?;
    ctx.emit(CommandEvent::StatRecord(record));
    Ok(())
}
