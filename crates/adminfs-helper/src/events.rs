//! Single-subscriber event channel of a command.

use adminfs_core::CommandEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Create a connected emitter and stream.
pub fn event_channel() -> (EventEmitter, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventEmitter {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        EventStream { rx },
    )
}

/// Sending side of a command's events.
///
/// At most one terminal event is sent and nothing follows it: the terminal
/// emit closes the channel under the same lock that guards every send.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<CommandEvent>>>>,
}

impl EventEmitter {
    /// Emit one event. Returns whether it was delivered to the channel.
    pub fn emit(&self, event: CommandEvent) -> bool {
        let mut guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            debug!(event = event.name(), "event after terminal result dropped");
            return false;
        };
        let terminal = event.is_terminal();
        // A gone subscriber is not an error for the job.
        let delivered = tx.send(event).is_ok();
        if terminal {
            *guard = None;
        }
        delivered
    }

    /// Resolve once the subscriber dropped its stream.
    ///
    /// Never resolves after the terminal event.
    pub async fn subscriber_gone(&self) {
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }

    /// Whether the terminal event has been emitted.
    pub fn is_terminated(&self) -> bool {
        self.tx.lock().is_none()
    }
}

/// Receiving side of a command's events.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<CommandEvent>,
}

impl EventStream {
    /// Next event; `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<CommandEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_next(&mut self) -> Option<CommandEvent> {
        self.rx.try_recv().ok()
    }
}
