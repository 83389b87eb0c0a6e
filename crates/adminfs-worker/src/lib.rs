//! # adminfs-worker
//!
//! The unprivileged half of adminfs. A [`WorkerProxy`] turns each
//! filesystem call of its [`WorkerHost`] into one helper command: create it,
//! subscribe, start it, then wait for its terminal result while forwarding
//! progress to the host. Cancellation observed on the host is forwarded as a
//! `kill`; the wait itself never ends before the terminal event arrives.
//!
//! Read-type calls share a debounced authorization decision so a burst of
//! listings does not prompt the user once per directory.

mod file;
pub mod host;
pub mod proxy;
mod wait;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use file::FileSession;
pub use host::WorkerHost;
pub use proxy::WorkerProxy;
