//! Table of live command objects.

use crate::command::CommandObject;
use adminfs_core::{AdminError, CommandAddress, Result, Verb};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Live commands keyed by address.
///
/// Serials start at 1, increase monotonically and are never reused. The
/// counter refuses to wrap; exhaustion is an internal error.
#[derive(Debug)]
pub struct CommandRegistry {
    next_serial: AtomicU64,
    commands: RwLock<HashMap<CommandAddress, Arc<CommandObject>>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub(crate) fn starting_at(serial: u64) -> Self {
        Self {
            next_serial: AtomicU64::new(serial),
            commands: RwLock::new(HashMap::new()),
        }
    }

    /// Take the next address for `verb`.
    pub fn allocate(&self, verb: Verb) -> Result<CommandAddress> {
        let serial = self
            .next_serial
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| AdminError::internal("command serials exhausted"))?;
        let serial = NonZeroU64::new(serial)
            .ok_or_else(|| AdminError::internal("command serial reached the sentinel"))?;
        Ok(CommandAddress::new(verb, serial))
    }

    /// Make `command` reachable at its address.
    pub fn register(&self, command: Arc<CommandObject>) {
        self.commands.write().insert(command.address(), command);
    }

    /// Command at `address`.
    pub fn get(&self, address: &CommandAddress) -> Option<Arc<CommandObject>> {
        self.commands.read().get(address).cloned()
    }

    /// Unregister the command at `address`.
    pub fn remove(&self, address: &CommandAddress) -> Option<Arc<CommandObject>> {
        self.commands.write().remove(address)
    }

    /// Number of live commands.
    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    /// Whether no command is live.
    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }
}
