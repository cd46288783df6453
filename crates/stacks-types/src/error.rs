use thiserror::Error;

use crate::chat::{ChatId, ChatStatus};

/// Errors from repository operations (used by trait definitions in stacks-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from resolving a session token to an identity.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing session token")]
    MissingToken,

    #[error("invalid session token")]
    InvalidToken,

    #[error("session expired")]
    Expired,

    #[error("identity lookup failed: {0}")]
    Lookup(String),
}

/// Errors raised by chat lifecycle operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat not found")]
    NotFound,

    #[error("not allowed: {0}")]
    Forbidden(String),

    #[error("invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: ChatStatus, to: ChatStatus },

    #[error("invalid chat: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<RepositoryError> for ChatError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => ChatError::NotFound,
            other => ChatError::Storage(other.to_string()),
        }
    }
}

/// Failure taxonomy of the real-time hub.
///
/// None of these are sent to clients; they are logged where they occur.
/// `AuthFailure` and `Protocol` are fatal to the affected connection, the
/// rest only drop the frame or message in question.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("authentication failed: {0}")]
    AuthFailure(#[from] AuthError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("frame for chat {frame_chat} does not match selected chat {selected:?}")]
    ValidationMismatch {
        frame_chat: ChatId,
        selected: Option<ChatId>,
    },

    #[error("failed to persist message: {0}")]
    Persistence(#[source] RepositoryError),

    #[error("cannot resolve recipients for chat {chat_id}: {reason}")]
    RoutingResolution { chat_id: ChatId, reason: String },

    #[error("router queue is full")]
    QueueSaturated,
}

impl HubError {
    /// Whether the connection that produced this error must be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HubError::AuthFailure(_) | HubError::Protocol(_))
    }
}
