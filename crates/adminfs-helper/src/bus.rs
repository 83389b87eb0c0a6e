//! Control channel between worker and helper.

use crate::dispatcher::Dispatcher;
use crate::events::EventStream;
use adminfs_core::{
    AdminError, CallerId, CommandAddress, ControlCall, ControlReply, Request, Result,
};
use adminfs_stream::PipeEndpoint;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const QUEUE_DEPTH: usize = 64;

/// What the worker can ask of the helper.
///
/// Failures of the channel itself are `Transport` errors.
#[async_trait]
pub trait HelperBus: Send + Sync {
    /// Create a command; streaming verbs pass their pipe end alongside.
    async fn create(
        &self,
        request: Request,
        endpoint: Option<PipeEndpoint>,
    ) -> Result<CommandAddress>;

    /// Become the single subscriber of a command's events.
    async fn subscribe(&self, caller: &CallerId, address: CommandAddress) -> Result<EventStream>;

    /// Make one control call.
    async fn control(
        &self,
        caller: &CallerId,
        address: CommandAddress,
        call: ControlCall,
    ) -> Result<ControlReply>;
}

enum BusMessage {
    Create {
        request: Request,
        endpoint: Option<PipeEndpoint>,
        reply: oneshot::Sender<Result<CommandAddress>>,
    },
    Subscribe {
        caller: CallerId,
        address: CommandAddress,
        reply: oneshot::Sender<Result<EventStream>>,
    },
    Control {
        caller: CallerId,
        address: CommandAddress,
        call: ControlCall,
        reply: oneshot::Sender<Result<ControlReply>>,
    },
    Shutdown,
}

/// In-process bus: a service task owning the dispatcher.
#[derive(Debug, Clone)]
pub struct LocalBus {
    tx: mpsc::Sender<BusMessage>,
    max_message_size: usize,
}

impl std::fmt::Debug for BusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusMessage::Create { request, .. } => write!(f, "Create({})", request.verb()),
            BusMessage::Subscribe { address, .. } => write!(f, "Subscribe({address})"),
            BusMessage::Control { address, call, .. } => {
                write!(f, "Control({address}, {})", call.name())
            }
            BusMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl LocalBus {
    /// Start the service task.
    pub fn spawn(dispatcher: Dispatcher, max_message_size: usize) -> (LocalBus, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let handle = tokio::spawn(serve(Arc::new(dispatcher), rx));
        (
            LocalBus {
                tx,
                max_message_size,
            },
            handle,
        )
    }

    /// Stop the service task. Later calls fail with `Transport`.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(BusMessage::Shutdown).await;
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T>>) -> BusMessage) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| AdminError::transport("helper is not running"))?;
        rx.await
            .map_err(|_| AdminError::transport("helper dropped the call"))?
    }
}

#[async_trait]
impl HelperBus for LocalBus {
    async fn create(
        &self,
        request: Request,
        endpoint: Option<PipeEndpoint>,
    ) -> Result<CommandAddress> {
        self.request(|reply| BusMessage::Create {
            request,
            endpoint,
            reply,
        })
        .await
    }

    async fn subscribe(&self, caller: &CallerId, address: CommandAddress) -> Result<EventStream> {
        let caller = caller.clone();
        self.request(|reply| BusMessage::Subscribe {
            caller,
            address,
            reply,
        })
        .await
    }

    async fn control(
        &self,
        caller: &CallerId,
        address: CommandAddress,
        call: ControlCall,
    ) -> Result<ControlReply> {
        if call.payload_len() > self.max_message_size {
            return Err(AdminError::transport(format!(
                "{} payload of {} bytes exceeds the message size limit of {}",
                call.name(),
                call.payload_len(),
                self.max_message_size
            )));
        }
        let caller = caller.clone();
        self.request(|reply| BusMessage::Control {
            caller,
            address,
            call,
            reply,
        })
        .await
    }
}

async fn serve(dispatcher: Arc<Dispatcher>, mut rx: mpsc::Receiver<BusMessage>) {
    info!("helper bus started");
    while let Some(message) = rx.recv().await {
        debug!(?message, "bus message");
        match message {
            BusMessage::Create {
                request,
                endpoint,
                reply,
            } => {
                let dispatcher = dispatcher.clone();
                // Authorization may prompt; other callers must not wait on it.
                tokio::spawn(async move {
                    let _ = reply.send(dispatcher.create(request, endpoint).await);
                });
            }
            BusMessage::Subscribe {
                caller,
                address,
                reply,
            } => {
                let _ = reply.send(dispatcher.subscribe(&caller, &address));
            }
            BusMessage::Control {
                caller,
                address,
                call,
                reply,
            } => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let _ = reply.send(dispatcher.control(&caller, &address, call).await);
                });
            }
            BusMessage::Shutdown => break,
        }
    }
    info!("helper bus stopped");
}
