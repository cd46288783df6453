//! Fan-out of persisted messages to live participant connections.
//!
//! Sessions hand persisted messages to a [`RouterHandle`] with a
//! non-blocking `try_send`; a single [`MessageRouter`] task drains the
//! bounded queue in order. For each message it resolves the chat,
//! computes the participants (owner plus assigned staff) and writes to every
//! registered connection of each participant. A connection that cannot take
//! the write is closed; delivery to everyone else continues.
//!
//! Routing is best-effort: the message is already durable before it is
//! queued, so anything dropped here is still visible in history.

use std::sync::Arc;
use std::time::Duration;

use stacks_types::chat::Message;
use stacks_types::error::HubError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::repository::ChatRepository;

use super::registry::ConnectionRegistry;

/// Create the bounded router queue.
pub fn channel(capacity: usize) -> (RouterHandle, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RouterHandle { tx }, rx)
}

/// Producer side of the router queue, cloned into every session.
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<Message>,
}

impl RouterHandle {
    /// Queue a persisted message for delivery without waiting.
    ///
    /// A full queue drops the message and returns `HubError::QueueSaturated`
    /// so a stalled router can never back-pressure a client's read loop.
    pub fn try_enqueue(&self, message: Message) -> Result<(), HubError> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(
                    message_id = message.id,
                    chat_id = message.chat_id,
                    "Router queue full, message not routed"
                );
                Err(HubError::QueueSaturated)
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                warn!(
                    message_id = message.id,
                    chat_id = message.chat_id,
                    "Router stopped, message not routed"
                );
                Err(HubError::QueueSaturated)
            }
        }
    }

    /// Free slots left in the queue.
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// Result of routing one message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteReport {
    /// Connections the message was queued on.
    pub delivered: usize,
    /// Connections closed because they could not take the write.
    pub failed: usize,
}

/// Single consumer of the router queue.
pub struct MessageRouter<C: ChatRepository> {
    repo: Arc<C>,
    registry: Arc<ConnectionRegistry>,
    rx: mpsc::Receiver<Message>,
}

impl<C: ChatRepository> MessageRouter<C> {
    pub fn new(repo: Arc<C>, registry: Arc<ConnectionRegistry>, rx: mpsc::Receiver<Message>) -> Self {
        Self { repo, registry, rx }
    }

    /// Drain the queue until `shutdown` fires or every producer is gone.
    ///
    /// On shutdown the queue is closed to new messages and whatever is
    /// already queued is routed until the queue is empty or `grace` elapses,
    /// whichever comes first.
    pub async fn run(mut self, shutdown: CancellationToken, grace: Duration) {
        info!("Message router started");
        loop {
            let next = tokio::select! {
                biased;
                next = self.rx.recv() => next,
                _ = shutdown.cancelled() => break,
            };
            match next {
                Some(message) => {
                    self.route(message).await;
                }
                None => {
                    info!("Router queue closed, message router stopped");
                    return;
                }
            }
        }

        self.rx.close();
        let drain = async {
            while let Some(message) = self.rx.recv().await {
                route_message(&*self.repo, &self.registry, message).await;
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Shutdown grace elapsed before router queue drained"
            );
        }
        info!("Message router stopped");
    }

    /// Deliver one message to every live connection of its participants.
    pub async fn route(&self, message: Message) -> RouteReport {
        route_message(&*self.repo, &self.registry, message).await
    }
}

async fn route_message<C: ChatRepository>(
    repo: &C,
    registry: &ConnectionRegistry,
    message: Message,
) -> RouteReport {
    let chat = match repo.get_chat(message.chat_id).await {
        Ok(Some(chat)) => chat,
        Ok(None) => {
            let err = HubError::RoutingResolution {
                chat_id: message.chat_id,
                reason: "chat not found".to_string(),
            };
            warn!(message_id = message.id, "{err}");
            return RouteReport::default();
        }
        Err(e) => {
            let err = HubError::RoutingResolution {
                chat_id: message.chat_id,
                reason: e.to_string(),
            };
            warn!(message_id = message.id, "{err}");
            return RouteReport::default();
        }
    };

    let message = Arc::new(message);
    let mut report = RouteReport::default();

    for user_id in chat.participants() {
        for connection in registry.connections_for(user_id) {
            match connection.deliver(Arc::clone(&message)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        conn_id = connection.id(),
                        user_id,
                        message_id = message.id,
                        error = %e,
                        "Write failed, closing connection"
                    );
                    connection.close();
                    report.failed += 1;
                }
            }
        }
    }

    debug!(
        message_id = message.id,
        chat_id = message.chat_id,
        delivered = report.delivered,
        failed = report.failed,
        "Message routed"
    );
    report
}
