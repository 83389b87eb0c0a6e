//! Filesystem verbs the helper can run on behalf of a worker.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One abstract filesystem operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    /// List the entries of a directory
    ListDir,
    /// Describe a single resource
    Stat,
    /// Stream a file's content to the worker
    Get,
    /// Stream content from the worker into a file
    Put,
    /// Copy a resource
    Copy,
    /// Delete a resource
    Del,
    /// Create a directory
    Mkdir,
    /// Rename or move a resource
    Rename,
    /// Change permission bits
    Chmod,
    /// Change owner and group
    Chown,
    /// Open a file for random access sub-operations
    File,
}

impl Verb {
    /// All verbs, in wire order.
    pub const ALL: [Verb; 11] = [
        Verb::ListDir,
        Verb::Stat,
        Verb::Get,
        Verb::Put,
        Verb::Copy,
        Verb::Del,
        Verb::Mkdir,
        Verb::Rename,
        Verb::Chmod,
        Verb::Chown,
        Verb::File,
    ];

    /// Wire name, also used as the address segment.
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::ListDir => "listDir",
            Verb::Stat => "stat",
            Verb::Get => "get",
            Verb::Put => "put",
            Verb::Copy => "copy",
            Verb::Del => "del",
            Verb::Mkdir => "mkdir",
            Verb::Rename => "rename",
            Verb::Chmod => "chmod",
            Verb::Chown => "chown",
            Verb::File => "file",
        }
    }

    /// Parse a wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|verb| verb.as_str() == name)
    }

    /// Read-type verbs are issued in bursts and share a debounced
    /// authorization decision; every other verb is checked individually.
    pub fn is_read(self) -> bool {
        matches!(self, Verb::ListDir | Verb::Stat)
    }

    /// Verbs whose command accepts `kill`.
    pub fn is_killable(self) -> bool {
        matches!(
            self,
            Verb::ListDir | Verb::Get | Verb::Put | Verb::Copy | Verb::Del
        )
    }

    /// Verbs that move bulk content through a stream pipe.
    pub fn is_streaming(self) -> bool {
        matches!(self, Verb::Get | Verb::Put)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
