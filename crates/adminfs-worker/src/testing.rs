//! Host double recording every callback.

use crate::host::WorkerHost;
use adminfs_core::{DirEntry, Result, StatRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// One callback received by a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// `list_entries`
    Entries(Vec<DirEntry>),
    /// `stat_entry`
    Stat(StatRecord),
    /// `data`
    Data(Vec<u8>),
    /// `mime_type`
    MimeType(String),
    /// `written`
    Written(u64),
    /// `position`
    Position(u64),
    /// `truncated`
    Truncated(u64),
    /// `request_data`
    DataRequested,
}

/// Host that records callbacks and serves queued upload chunks.
#[derive(Debug, Default)]
pub struct RecordingHost {
    events: Mutex<Vec<HostEvent>>,
    chunks: Mutex<VecDeque<Vec<u8>>>,
    killed: AtomicBool,
}

impl RecordingHost {
    /// Host with nothing to upload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host answering data requests with `chunks`, then with the end.
    pub fn with_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let host = Self::default();
        host.chunks
            .lock()
            .extend(chunks.into_iter().map(Into::into));
        host
    }

    /// Ask for cancellation of the current call.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    /// Every callback so far.
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    /// Listed entries, flattened across batches.
    pub fn entries(&self) -> Vec<DirEntry> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Entries(batch) => Some(batch.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Received stat records.
    pub fn stats(&self) -> Vec<StatRecord> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Stat(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    /// Received data blobs, one per callback.
    pub fn blobs(&self) -> Vec<Vec<u8>> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Data(blob) => Some(blob.clone()),
                _ => None,
            })
            .collect()
    }

    /// Received data, concatenated.
    pub fn received(&self) -> Vec<u8> {
        self.blobs().concat()
    }

    fn record(&self, event: HostEvent) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl WorkerHost for RecordingHost {
    async fn list_entries(&self, entries: Vec<DirEntry>) {
        self.record(HostEvent::Entries(entries));
    }

    async fn stat_entry(&self, record: StatRecord) {
        self.record(HostEvent::Stat(record));
    }

    async fn data(&self, blob: Vec<u8>) {
        self.record(HostEvent::Data(blob));
    }

    async fn mime_type(&self, mime: String) {
        self.record(HostEvent::MimeType(mime));
    }

    async fn written(&self, len: u64) {
        self.record(HostEvent::Written(len));
    }

    async fn position(&self, offset: u64) {
        self.record(HostEvent::Position(offset));
    }

    async fn truncated(&self, len: u64) {
        self.record(HostEvent::Truncated(len));
    }

    async fn request_data(&self) -> Result<Vec<u8>> {
        self.record(HostEvent::DataRequested);
        Ok(self.chunks.lock().pop_front().unwrap_or_default())
    }

    fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}
