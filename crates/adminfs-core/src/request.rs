//! Requests sent from the worker to the helper's dispatcher.

use crate::errors::{AdminError, Result};
use crate::locator::Locator;
use crate::verb::Verb;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Identity of the process on the other end of the control channel.
///
/// This is the subject of every authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallerId(String);

impl CallerId {
    /// Wrap a caller name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Caller name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Job behaviour flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobFlags(u32);

impl JobFlags {
    /// No flags.
    pub const NONE: JobFlags = JobFlags(0);
    /// Append to a partially transferred destination.
    pub const RESUME: JobFlags = JobFlags(0x2);
    /// Replace an existing destination.
    pub const OVERWRITE: JobFlags = JobFlags(0x4);

    /// Build from raw bits, dropping unknown ones.
    pub fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & (Self::RESUME.0 | Self::OVERWRITE.0))
    }

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: JobFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for JobFlags {
    type Output = JobFlags;

    fn bitor(self, rhs: JobFlags) -> JobFlags {
        JobFlags(self.0 | rhs.0)
    }
}

/// Open mode for the `File` verb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpenMode(u32);

impl OpenMode {
    /// Open for reading.
    pub const READ: OpenMode = OpenMode(0x1);
    /// Open for writing.
    pub const WRITE: OpenMode = OpenMode(0x2);
    /// Writes go to the end of the file.
    pub const APPEND: OpenMode = OpenMode(0x4);
    /// Truncate the file when opening.
    pub const TRUNCATE: OpenMode = OpenMode(0x8);

    /// Build from raw bits, dropping unknown ones.
    pub fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0xf)
    }

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: OpenMode) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the mode allows any kind of write.
    pub fn is_writable(self) -> bool {
        self.contains(Self::WRITE) || self.contains(Self::APPEND)
    }
}

impl BitOr for OpenMode {
    type Output = OpenMode;

    fn bitor(self, rhs: OpenMode) -> OpenMode {
        OpenMode(self.0 | rhs.0)
    }
}

/// Verb plus its locator(s) and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// List a directory
    ListDir {
        /// Directory to list
        url: Locator,
    },
    /// Stat a resource
    Stat {
        /// Resource to describe
        url: Locator,
    },
    /// Read a file through the stream pipe
    Get {
        /// File to read
        url: Locator,
    },
    /// Write a file through the stream pipe
    Put {
        /// Destination file
        url: Locator,
        /// Permission bits for the written file, if any
        permissions: Option<u32>,
        /// Overwrite / resume behaviour
        flags: JobFlags,
    },
    /// Copy `src` to `dst`
    Copy {
        /// Source resource
        src: Locator,
        /// Destination resource
        dst: Locator,
        /// Permission bits for the destination, if any
        permissions: Option<u32>,
        /// Overwrite behaviour
        flags: JobFlags,
    },
    /// Delete a resource
    Del {
        /// Resource to delete
        url: Locator,
    },
    /// Create a directory
    Mkdir {
        /// Directory to create
        url: Locator,
        /// Permission bits for the new directory, if any
        permissions: Option<u32>,
    },
    /// Rename `src` to `dst`
    Rename {
        /// Source resource
        src: Locator,
        /// Destination resource
        dst: Locator,
        /// Overwrite behaviour
        flags: JobFlags,
    },
    /// Change permission bits
    Chmod {
        /// Resource to change
        url: Locator,
        /// New permission bits
        permissions: u32,
    },
    /// Change owner and group
    Chown {
        /// Resource to change
        url: Locator,
        /// New owner name
        owner: String,
        /// New group name
        group: String,
    },
    /// Open a file for sub-operations
    File {
        /// File to open
        url: Locator,
        /// Open mode
        mode: OpenMode,
    },
}

impl Command {
    /// Verb of this command.
    pub fn verb(&self) -> Verb {
        match self {
            Command::ListDir { .. } => Verb::ListDir,
            Command::Stat { .. } => Verb::Stat,
            Command::Get { .. } => Verb::Get,
            Command::Put { .. } => Verb::Put,
            Command::Copy { .. } => Verb::Copy,
            Command::Del { .. } => Verb::Del,
            Command::Mkdir { .. } => Verb::Mkdir,
            Command::Rename { .. } => Verb::Rename,
            Command::Chmod { .. } => Verb::Chmod,
            Command::Chown { .. } => Verb::Chown,
            Command::File { .. } => Verb::File,
        }
    }

    /// Primary locator the command acts on.
    pub fn url(&self) -> &Locator {
        match self {
            Command::ListDir { url }
            | Command::Stat { url }
            | Command::Get { url }
            | Command::Put { url, .. }
            | Command::Del { url }
            | Command::Mkdir { url, .. }
            | Command::Chmod { url, .. }
            | Command::Chown { url, .. }
            | Command::File { url, .. } => url,
            Command::Copy { src, .. } | Command::Rename { src, .. } => src,
        }
    }

    /// Reject parameters no job could act on.
    pub fn validate(&self) -> Result<()> {
        let permissions = match self {
            Command::Put { permissions, .. }
            | Command::Copy { permissions, .. }
            | Command::Mkdir { permissions, .. } => *permissions,
            Command::Chmod { permissions, .. } => Some(*permissions),
            _ => None,
        };
        if let Some(bits) = permissions {
            if bits > 0o7777 {
                return Err(AdminError::invalid(format!(
                    "permission bits out of range: {bits:o}"
                )));
            }
        }

        match self {
            Command::Chown { owner, group, .. } if owner.is_empty() && group.is_empty() => {
                Err(AdminError::invalid("chown needs an owner or a group"))
            }
            Command::File { mode, .. } if mode.bits() == 0 => {
                Err(AdminError::invalid("file open mode is empty"))
            }
            Command::Copy { src, dst, .. } | Command::Rename { src, dst, .. } if src == dst => {
                Err(AdminError::invalid(format!(
                    "source and destination are the same: {src}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// One privileged operation requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Who is asking
    pub caller: CallerId,
    /// What is being asked
    pub command: Command,
}

impl Request {
    /// Build a request.
    pub fn new(caller: CallerId, command: Command) -> Self {
        Self { caller, command }
    }

    /// Verb of the requested command.
    pub fn verb(&self) -> Verb {
        self.command.verb()
    }
}
