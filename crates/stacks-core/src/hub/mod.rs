//! Real-time chat hub.
//!
//! [`ChatHub`] owns the shared pieces of the real-time path: the connection
//! registry, the router queue and its task, and the root cancellation token
//! every connection derives its liveness from. Transports call
//! [`ChatHub::connect`] after authenticating a client and drive the returned
//! [`Session`](session::Session).

pub mod connection;
pub mod registry;
pub mod router;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use stacks_types::chat::Message;
use stacks_types::config::HubConfig;
use stacks_types::error::HubError;
use stacks_types::identity::Identity;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chat::repository::ChatRepository;

use self::connection::Connection;
use self::registry::ConnectionRegistry;
use self::router::{MessageRouter, RouterHandle};
use self::session::{FrameLimits, Session};

/// Extra time past the drain grace before shutdown gives up on the router.
const ROUTER_JOIN_SLACK: Duration = Duration::from_secs(1);

pub struct ChatHub<C: ChatRepository + 'static> {
    repo: Arc<C>,
    registry: Arc<ConnectionRegistry>,
    router: RouterHandle,
    config: HubConfig,
    shutdown: CancellationToken,
    router_task: Mutex<Option<JoinHandle<()>>>,
}

impl<C: ChatRepository + 'static> ChatHub<C> {
    /// Build the hub and spawn its router task. Must run inside a tokio runtime.
    pub fn start(repo: Arc<C>, config: HubConfig) -> Self {
        let config = config.sanitized();
        let registry = Arc::new(ConnectionRegistry::new());
        let (router, rx) = router::channel(config.queue_capacity);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(
            MessageRouter::new(repo.clone(), registry.clone(), rx)
                .run(shutdown.clone(), config.shutdown_grace()),
        );

        info!(
            queue_capacity = config.queue_capacity,
            outbound_buffer = config.outbound_buffer,
            "Chat hub started"
        );

        Self {
            repo,
            registry,
            router,
            config,
            shutdown,
            router_task: Mutex::new(Some(task)),
        }
    }

    /// Register a new connection for an authenticated identity.
    ///
    /// Returns the session that drives it and the receiving end of its
    /// outbound queue, which the transport writer drains.
    pub fn connect(
        &self,
        identity: Identity,
    ) -> Result<(Session<C>, mpsc::Receiver<Arc<Message>>), HubError> {
        if self.shutdown.is_cancelled() {
            return Err(HubError::Protocol("hub is shutting down".to_string()));
        }

        let (tx, rx) = mpsc::channel(self.config.outbound_buffer);
        let connection = Connection::new(identity.user_id, tx, self.shutdown.child_token());
        self.registry
            .register(identity.user_id, connection.clone())
            .map_err(|e| HubError::Protocol(e.to_string()))?;

        info!(
            conn_id = connection.id(),
            user_id = identity.user_id,
            role = %identity.role,
            "Connection opened"
        );

        let session = Session::new(
            identity,
            connection,
            self.repo.clone(),
            self.registry.clone(),
            self.router.clone(),
            FrameLimits {
                max_frame_bytes: self.config.max_frame_bytes,
                max_content_chars: self.config.max_content_chars,
            },
        );
        Ok((session, rx))
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting connections, close every live one, and wait for the
    /// router to drain what is already queued.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.registry.close_all();

        let Some(task) = self.router_task.lock().await.take() else {
            return;
        };
        let deadline = self.config.shutdown_grace() + ROUTER_JOIN_SLACK;
        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(())) => info!("Chat hub stopped"),
            Ok(Err(e)) => warn!(error = %e, "Router task failed"),
            Err(_) => warn!(
                timeout_ms = deadline.as_millis() as u64,
                "Router did not stop in time"
            ),
        }
    }
}
