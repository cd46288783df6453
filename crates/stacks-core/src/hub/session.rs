//! Per-connection session state machine.
//!
//! A [`Session`] is created by [`ChatHub::connect`](super::ChatHub::connect)
//! once the transport layer has authenticated the caller and upgraded the
//! connection, so it starts in `AwaitingChatSelection`:
//!
//! ```text
//! (Handshaking, transport) -> AwaitingChatSelection -> Active { chat_id } -> Closed
//! ```
//!
//! The session is transport-agnostic. The WebSocket pump feeds it text frames
//! through [`Session::handle_text`] and calls [`Session::close`] when the
//! socket ends. Cleanup runs exactly once; dropping the session runs it too.

use std::sync::Arc;

use stacks_types::chat::{ChatId, ClientFrame, MessageId, NewMessage};
use stacks_types::error::HubError;
use stacks_types::identity::Identity;
use tracing::{debug, info, warn};

use crate::chat::repository::ChatRepository;

use super::connection::Connection;
use super::registry::ConnectionRegistry;
use super::router::RouterHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no chat announced yet.
    AwaitingChatSelection,
    /// Bound to a chat the identity participates in.
    Active { chat_id: ChatId },
    /// Terminal. The connection has been unregistered.
    Closed,
}

/// What happened to one non-fatal inbound frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Selection frame accepted; the session is now bound to this chat.
    Selected(ChatId),
    /// Selection frame for a chat that does not exist or that the identity
    /// does not participate in. The previous binding is kept.
    SelectionRejected(ChatId),
    /// Message persisted and queued for routing.
    Routed(MessageId),
    /// Frame dropped; the connection stays open.
    Dropped(HubError),
}

/// Size bounds applied to inbound frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    pub max_frame_bytes: usize,
    pub max_content_chars: usize,
}

/// Control loop state for one connection.
pub struct Session<C: ChatRepository> {
    identity: Identity,
    connection: Connection,
    state: SessionState,
    repo: Arc<C>,
    registry: Arc<ConnectionRegistry>,
    router: RouterHandle,
    limits: FrameLimits,
}

impl<C: ChatRepository> Session<C> {
    pub(crate) fn new(
        identity: Identity,
        connection: Connection,
        repo: Arc<C>,
        registry: Arc<ConnectionRegistry>,
        router: RouterHandle,
        limits: FrameLimits,
    ) -> Self {
        Self {
            identity,
            connection,
            state: SessionState::AwaitingChatSelection,
            repo,
            registry,
            router,
            limits,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn selected_chat(&self) -> Option<ChatId> {
        match self.state {
            SessionState::Active { chat_id } => Some(chat_id),
            _ => None,
        }
    }

    /// Process one inbound text frame.
    ///
    /// `Err` means a protocol violation: the caller must close the session.
    /// Every other failure is reported as `FrameOutcome::Dropped`.
    pub async fn handle_text(&mut self, text: &str) -> Result<FrameOutcome, HubError> {
        if self.state == SessionState::Closed {
            return Err(HubError::Protocol("session is closed".to_string()));
        }
        if text.len() > self.limits.max_frame_bytes {
            return Err(HubError::Protocol(format!(
                "frame of {} bytes exceeds limit of {}",
                text.len(),
                self.limits.max_frame_bytes
            )));
        }
        let frame: ClientFrame = serde_json::from_str(text)
            .map_err(|e| HubError::Protocol(format!("malformed frame: {e}")))?;
        self.handle_frame(frame).await
    }

    /// Process one decoded frame. See [`Session::handle_text`].
    pub async fn handle_frame(&mut self, frame: ClientFrame) -> Result<FrameOutcome, HubError> {
        if self.state == SessionState::Closed {
            return Err(HubError::Protocol("session is closed".to_string()));
        }
        if frame.is_selection() {
            Ok(self.select_chat(frame.chat_id).await)
        } else {
            self.post_message(frame).await
        }
    }

    async fn select_chat(&mut self, chat_id: ChatId) -> FrameOutcome {
        let user_id = self.identity.user_id;
        match self.repo.get_chat(chat_id).await {
            Ok(Some(chat)) if chat.is_participant(user_id) => {
                self.state = SessionState::Active { chat_id };
                debug!(conn_id = self.connection.id(), user_id, chat_id, "Chat selected");
                FrameOutcome::Selected(chat_id)
            }
            Ok(Some(_)) => {
                warn!(
                    conn_id = self.connection.id(),
                    user_id, chat_id, "Selection rejected: not a participant"
                );
                FrameOutcome::SelectionRejected(chat_id)
            }
            Ok(None) => {
                warn!(
                    conn_id = self.connection.id(),
                    user_id, chat_id, "Selection rejected: chat not found"
                );
                FrameOutcome::SelectionRejected(chat_id)
            }
            Err(e) => {
                warn!(
                    conn_id = self.connection.id(),
                    user_id,
                    chat_id,
                    error = %e,
                    "Selection lookup failed"
                );
                FrameOutcome::Dropped(HubError::Persistence(e))
            }
        }
    }

    async fn post_message(&mut self, frame: ClientFrame) -> Result<FrameOutcome, HubError> {
        let selected = self.selected_chat();
        if selected != Some(frame.chat_id) {
            let err = HubError::ValidationMismatch {
                frame_chat: frame.chat_id,
                selected,
            };
            warn!(
                conn_id = self.connection.id(),
                user_id = self.identity.user_id,
                "{err}"
            );
            return Ok(FrameOutcome::Dropped(err));
        }

        let content_chars = frame.content.chars().count();
        if content_chars > self.limits.max_content_chars {
            return Err(HubError::Protocol(format!(
                "content of {content_chars} characters exceeds limit of {}",
                self.limits.max_content_chars
            )));
        }

        let new_message = NewMessage::from_identity(frame.chat_id, &self.identity, frame.content);
        let stored = match self.repo.save_message(&new_message).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    conn_id = self.connection.id(),
                    user_id = self.identity.user_id,
                    chat_id = frame.chat_id,
                    error = %e,
                    "Message not persisted, dropping frame"
                );
                return Ok(FrameOutcome::Dropped(HubError::Persistence(e)));
            }
        };

        let message_id = stored.id;
        match self.router.try_enqueue(stored) {
            Ok(()) => Ok(FrameOutcome::Routed(message_id)),
            Err(e) => Ok(FrameOutcome::Dropped(e)),
        }
    }

    /// Unregister this connection and release the transport.
    ///
    /// Returns `false` if the session was already closed.
    pub fn close(&mut self, reason: &str) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;
        self.connection.close();
        self.registry
            .unregister(self.identity.user_id, &self.connection);
        info!(
            conn_id = self.connection.id(),
            user_id = self.identity.user_id,
            reason,
            "Session closed"
        );
        true
    }
}

impl<C: ChatRepository> Drop for Session<C> {
    fn drop(&mut self) {
        self.close("session dropped");
    }
}
