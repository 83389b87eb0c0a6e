//! # adminfs-helper
//!
//! The privileged half of adminfs. A [`Dispatcher`] authorizes each caller,
//! then registers a [`CommandObject`] for the requested verb at a fresh
//! address. The caller subscribes to the object's events, starts it and
//! drives it with control calls; every control call is authorized again.
//! Each command delivers exactly one terminal `result` event.
//!
//! [`LocalBus`] serves the [`HelperBus`] contract in-process.

pub mod bus;
pub mod command;
pub mod dispatcher;
pub mod events;
pub mod job;
pub mod jobs;
pub mod registry;

pub use bus::{HelperBus, LocalBus};
pub use command::{CommandObject, VerbCommand};
pub use dispatcher::Dispatcher;
pub use events::{event_channel, EventEmitter, EventStream};
pub use job::{spawn_job, CommandState, JobContext, KillSignal, KillSwitch};
pub use registry::CommandRegistry;
