//! # adminfs-stream
//!
//! Bulk data for `get` and `put` does not travel over the control channel.
//! It goes through a one-way OS pipe carrying length-prefixed frames:
//!
//! ```text
//! [u32 little-endian length][payload] ... [0u32]
//! ```
//!
//! The zero-length frame marks end of data, so closing the pipe early is
//! distinguishable from a completed transfer.

mod pipe;

pub use pipe::{Drained, PipeEndpoint, PipeReader, PipeWriter, StreamPipe, MAX_FRAME_LEN};

/// Split `blob` into consecutive pieces of at most `max` bytes.
pub fn split_message(blob: &[u8], max: usize) -> impl Iterator<Item = &[u8]> {
    blob.chunks(max.max(1))
}
