//! Contract of whoever the worker works for.

use adminfs_core::{DirEntry, Result, StatRecord};
use async_trait::async_trait;

/// Receiver of command progress and source of upload data.
///
/// Every callback has a no-op default so hosts implement only what their
/// calls produce.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// A batch of directory entries.
    async fn list_entries(&self, _entries: Vec<DirEntry>) {}

    /// The record of a stat call.
    async fn stat_entry(&self, _record: StatRecord) {}

    /// File content, at most one message in size.
    async fn data(&self, _blob: Vec<u8>) {}

    /// Detected content type.
    async fn mime_type(&self, _mime: String) {}

    /// Bytes accepted by a file write.
    async fn written(&self, _len: u64) {}

    /// Offset after a seek.
    async fn position(&self, _offset: u64) {}

    /// Length after a truncate.
    async fn truncated(&self, _len: u64) {}

    /// Next chunk of upload data; empty means the upload is complete.
    async fn request_data(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Whether the host wants the current call cancelled.
    fn was_killed(&self) -> bool {
        false
    }
}
