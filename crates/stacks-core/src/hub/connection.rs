//! Handle to one live client transport.
//!
//! A [`Connection`] is cheap to clone: the registry and the router hold
//! copies, while the session that created it owns the receiving end of its
//! outbound queue and the socket itself. Writes never block; a connection
//! whose queue is full is treated as a slow consumer and closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use stacks_types::chat::Message;
use stacks_types::identity::UserId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Process-unique connection identifier.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Why a write to a connection did not happen.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection is closed")]
    Closed,

    #[error("outbound buffer is full")]
    SlowConsumer,
}

/// One live client connection, tied to a single identity for its lifetime.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    outbound: mpsc::Sender<Arc<Message>>,
    liveness: CancellationToken,
}

impl Connection {
    /// Create a connection for `user_id` that writes into `outbound`.
    ///
    /// Cancelling `liveness` (directly or through a parent token) marks the
    /// connection dead and wakes the session that owns it.
    pub fn new(
        user_id: UserId,
        outbound: mpsc::Sender<Arc<Message>>,
        liveness: CancellationToken,
    ) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            user_id,
            outbound,
            liveness,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_live(&self) -> bool {
        !self.liveness.is_cancelled() && !self.outbound.is_closed()
    }

    /// Queue a message for the transport writer without waiting.
    pub fn deliver(&self, message: Arc<Message>) -> Result<(), DeliveryError> {
        if self.liveness.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::SlowConsumer,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Mark the connection dead. The owning session notices and cleans up.
    pub fn close(&self) {
        self.liveness.cancel();
    }

    /// Resolves once the connection has been closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.liveness.cancelled()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("live", &self.is_live())
            .finish()
    }
}
