//! Control calls made on an already created command object.

use serde::{Deserialize, Serialize};

/// A control call on a live command.
///
/// Each call is authorized again by the helper before it takes effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCall {
    /// Begin the privileged job (for `File`: open the file)
    Start,
    /// Ask the job to abort
    Kill,
    /// Put: the answer to the last `dataRequest` is in the stream pipe
    Data,
    /// File: read up to this many bytes
    Read(u64),
    /// File: write these bytes
    Write(#[serde(with = "serde_bytes")] Vec<u8>),
    /// File: move to this absolute offset
    Seek(u64),
    /// File: truncate to this length
    Truncate(u64),
    /// File: close the file and finish the command
    Close,
    /// File: current size of the file
    Size,
}

impl ControlCall {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ControlCall::Start => "start",
            ControlCall::Kill => "kill",
            ControlCall::Data => "data",
            ControlCall::Read(_) => "read",
            ControlCall::Write(_) => "write",
            ControlCall::Seek(_) => "seek",
            ControlCall::Truncate(_) => "truncate",
            ControlCall::Close => "close",
            ControlCall::Size => "size",
        }
    }

    /// Bytes carried inline by this call.
    pub fn payload_len(&self) -> usize {
        match self {
            ControlCall::Write(data) => data.len(),
            _ => 0,
        }
    }
}

/// Synchronous reply to a control call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlReply {
    /// The call was accepted; its effect is reported through events
    Done,
    /// Reply to `Size`
    Size(u64),
}
