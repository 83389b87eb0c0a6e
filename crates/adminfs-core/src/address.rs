//! Externally visible addresses of live command objects.

use crate::verb::Verb;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Address prefix shared by every command object.
pub const ADDRESS_PREFIX: &str = "/org/adminfs";

/// Table key of a registered command, made visible to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandAddress {
    verb: Verb,
    serial: NonZeroU64,
}

impl CommandAddress {
    /// Combine a verb with a registry serial.
    pub fn new(verb: Verb, serial: NonZeroU64) -> Self {
        Self { verb, serial }
    }

    /// Verb of the addressed command.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Registry serial; never zero, never reused.
    pub fn serial(&self) -> NonZeroU64 {
        self.serial
    }

    /// Path form, e.g. `/org/adminfs/stat/7`.
    pub fn path(&self) -> String {
        format!("{ADDRESS_PREFIX}/{}/{}", self.verb, self.serial)
    }

    /// Parse the path form.
    pub fn parse(path: &str) -> Option<Self> {
        let rest = path.strip_prefix(ADDRESS_PREFIX)?.strip_prefix('/')?;
        let (verb, serial) = rest.split_once('/')?;
        Some(Self {
            verb: Verb::from_wire(verb)?,
            serial: serial.parse().ok()?,
        })
    }
}

impl fmt::Display for CommandAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
