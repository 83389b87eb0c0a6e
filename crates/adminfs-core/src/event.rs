//! Outbound events emitted by a command object.

use crate::entry::{DirEntry, StatRecord};
use crate::error_code::ErrorCode;
use crate::errors::{AdminError, Result};
use serde::{Deserialize, Serialize};

/// Final outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Error code; `NoError` on success
    pub code: ErrorCode,
    /// Human-readable message; empty on success
    pub message: String,
}

impl CommandResult {
    /// A successful outcome.
    pub fn success() -> Self {
        Self {
            code: ErrorCode::NoError,
            message: String::new(),
        }
    }

    /// A failed outcome.
    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Outcome reported for an error.
    pub fn from_error(err: &AdminError) -> Self {
        Self::failure(err.code(), err.message())
    }

    /// Whether the command succeeded.
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Convert into the caller-facing result.
    pub fn into_result(self) -> Result<()> {
        match self.code {
            ErrorCode::NoError => Ok(()),
            ErrorCode::AccessDenied => Err(AdminError::access_denied(self.message)),
            ErrorCode::Cancelled => Err(AdminError::cancelled(self.message)),
            code => Err(AdminError::operation(code, self.message)),
        }
    }
}

/// Event emitted by a command towards its single subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandEvent {
    /// ListDir: a batch of directory entries
    Entries(Vec<DirEntry>),
    /// Stat: the record of the resource
    StatRecord(StatRecord),
    /// File: bytes read
    Data(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Put: the job wants the next chunk
    DataRequest,
    /// Get/File: detected content type
    MimeTypeFound(String),
    /// File: bytes written
    Written(u64),
    /// File: current offset after a seek
    PositionChanged(u64),
    /// File: new length after a truncate
    Truncated(u64),
    /// File: the file is open
    Opened,
    /// File: the file is closed
    Closed,
    /// Terminal outcome; always the last event of a command
    Result(CommandResult),
}

impl CommandEvent {
    /// Whether this is the terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandEvent::Result(_))
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            CommandEvent::Entries(_) => "entries",
            CommandEvent::StatRecord(_) => "statRecord",
            CommandEvent::Data(_) => "data",
            CommandEvent::DataRequest => "dataRequest",
            CommandEvent::MimeTypeFound(_) => "mimeTypeFound",
            CommandEvent::Written(_) => "written",
            CommandEvent::PositionChanged(_) => "positionChanged",
            CommandEvent::Truncated(_) => "truncated",
            CommandEvent::Opened => "opened",
            CommandEvent::Closed => "closed",
            CommandEvent::Result(_) => "result",
        }
    }
}
