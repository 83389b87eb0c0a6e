//! Numeric error codes carried by terminal `result` events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Error code of a terminal command result.
///
/// The numeric values are part of the control-channel contract and never
/// change meaning once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// The command completed successfully
    NoError = 0,
    /// Authorization failed
    AccessDenied = 1,
    /// The resource could not be read
    CannotRead = 2,
    /// The resource could not be written
    CannotWrite = 3,
    /// The resource does not exist
    DoesNotExist = 4,
    /// The destination already exists and overwriting was not requested
    AlreadyExists = 5,
    /// A file was expected but a directory was found
    IsDirectory = 6,
    /// A directory was expected but something else was found
    NotDirectory = 7,
    /// The command was killed before it finished
    Cancelled = 8,
    /// The command does not support the requested control call
    Unsupported = 9,
    /// Transport or internal failure
    Internal = 10,
}

impl ErrorCode {
    /// Whether this code denotes success.
    pub fn is_success(self) -> bool {
        self == Self::NoError
    }

    /// Stable wire value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Decode a wire value; unknown values collapse to `Internal`.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::AccessDenied,
            2 => Self::CannotRead,
            3 => Self::CannotWrite,
            4 => Self::DoesNotExist,
            5 => Self::AlreadyExists,
            6 => Self::IsDirectory,
            7 => Self::NotDirectory,
            8 => Self::Cancelled,
            9 => Self::Unsupported,
            _ => Self::Internal,
        }
    }

    /// Classify an I/O error, using `fallback` when the kind says nothing
    /// more specific than "it failed".
    pub fn from_io(err: &io::Error, fallback: ErrorCode) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::DoesNotExist,
            io::ErrorKind::PermissionDenied => Self::AccessDenied,
            io::ErrorKind::AlreadyExists => Self::AlreadyExists,
            _ => match err.raw_os_error() {
                Some(code) if code == errno::EISDIR => Self::IsDirectory,
                Some(code) if code == errno::ENOTDIR => Self::NotDirectory,
                _ => fallback,
            },
        }
    }
}

// Linux errno values
mod errno {
    pub const ENOTDIR: i32 = 20;
    pub const EISDIR: i32 = 21;
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoError => "no error",
            Self::AccessDenied => "access denied",
            Self::CannotRead => "cannot read",
            Self::CannotWrite => "cannot write",
            Self::DoesNotExist => "does not exist",
            Self::AlreadyExists => "already exists",
            Self::IsDirectory => "is a directory",
            Self::NotDirectory => "not a directory",
            Self::Cancelled => "cancelled",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal error",
        };
        f.write_str(text)
    }
}
