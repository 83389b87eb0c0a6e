//! # adminfs-core
//!
//! Shared vocabulary of the adminfs privilege split: the verbs an
//! unprivileged worker may ask the privileged helper to run, the requests and
//! control calls that travel over the control channel, the events a command
//! emits back, the unified error type and the runtime configuration.
//!
//! Nothing in this crate performs I/O on behalf of a caller.

pub mod address;
pub mod config;
pub mod control;
pub mod entry;
pub mod error_code;
pub mod errors;
pub mod event;
pub mod locator;
pub mod request;
pub mod verb;

pub use address::CommandAddress;
pub use config::{AdminConfig, AuthorityConfig, DefaultPolicy};
pub use control::{ControlCall, ControlReply};
pub use entry::{DirEntry, FileType, StatRecord};
pub use error_code::ErrorCode;
pub use errors::{AdminError, Result};
pub use event::{CommandEvent, CommandResult};
pub use locator::Locator;
pub use request::{CallerId, Command, JobFlags, OpenMode, Request};
pub use verb::Verb;

/// Capability identifier checked for command creation and every control call.
pub const DEFAULT_ACTION_ID: &str = "org.adminfs.commands";

/// Largest payload carried by a single control-channel message.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
