//! Directory entry and stat records.

use serde::{Deserialize, Serialize};

/// Kind of filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Device, socket, fifo or anything else
    Other,
}

/// Description of one resource, as reported by `stat` and inside listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    /// Display name (last path component)
    pub name: String,
    /// Object kind
    pub file_type: FileType,
    /// Size in bytes
    pub size: u64,
    /// Permission bits (`st_mode & 0o7777`)
    pub mode: u32,
    /// Owner uid
    pub uid: u32,
    /// Owner gid
    pub gid: u32,
    /// Owner name, when resolvable
    pub user: Option<String>,
    /// Group name, when resolvable
    pub group: Option<String>,
    /// Modification time, seconds since the epoch
    pub modified: i64,
    /// Access time, seconds since the epoch
    pub accessed: i64,
    /// Target of a symbolic link
    pub link_target: Option<String>,
    /// Guessed content type
    pub mime_type: Option<String>,
}

impl StatRecord {
    /// Whether the record describes a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// One entry of a directory listing.
pub type DirEntry = StatRecord;
